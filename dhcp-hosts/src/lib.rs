//! Static host reservations for an ISC DHCP server.
//!
//! Hosts live as `host <name> { ... }` blocks inside a `dhcpd.conf`; which
//! addresses may be handed out is decided by a shell script of
//! `checa_regra "<category>" "<access>" "<start>" "<end>"` lines. This crate
//! keeps the two consistent: every change is validated against the current
//! file and the rules before anything is written.
//!
//! # Architecture
//!
//! ## Core
//!
//! - [`ip`] - Dotted-quad and MAC validation, address arithmetic, free address listing
//! - [`rules`] - Loading the rules script and looking up the rule for an address
//! - [`reconcile`] - Validation and planning of create, update, rename and delete
//! - [`store`] - The locked read-validate-write cycle, queries and service restart
//! - [`lock`] - OS advisory lock on a file next to the config
//!
//! ## Collaborators
//!
//! - [`service`] - `systemctl` status and restart, plus a simulated controller
//! - [`audit`] - Audit entries, written to the log and optionally a JSON-lines file
//!
//! ## Surface
//!
//! - [`settings`] - TOML settings with defaults for every key
//! - [`report`] - Colored terminal output
//!
//! # Workflow
//!
//! Each mutation runs the same steps:
//!
//! 1. **Lock** `<conf>.lock`, waiting up to the configured timeout
//! 2. **Read** the config into a [`dhcpd_conf::ConfigDocument`] and load the rules
//! 3. **Plan** the change; any failed check rejects it without touching the file
//! 4. **Write** the new document atomically and release the lock
//! 5. **Restart** the DHCP service; a failure becomes a warning on the outcome
//! 6. **Audit** the result, successful or not
//!
//! # Examples
//!
//! ```ignore
//! use dhcp_hosts::audit::LogAudit;
//! use dhcp_hosts::service::SimulatedService;
//! use dhcp_hosts::store::HostStore;
//!
//! let store = HostStore::new(
//!     "/etc/dhcp/dhcpd.conf",
//!     "/etc/dhcp/ips_disponiveis.sh",
//!     Box::new(SimulatedService::new("isc-dhcp-server")),
//!     Box::new(LogAudit),
//! );
//! let outcome = store.create("printer1", "AA:BB:CC:DD:EE:01", "10.0.0.15")?;
//! println!("{} -> {}", outcome.host.name, outcome.rule);
//! ```
//!
//! # Built on dhcpd-conf
//!
//! Parsing and writing of the config file is done by `dhcpd-conf`, which
//! knows nothing about rules, services or auditing.

pub mod audit;
pub mod ip;
pub mod lock;
pub mod reconcile;
pub mod report;
pub mod rules;
pub mod service;
pub mod settings;
pub mod store;
