//! Declarative package builder.
//!
//! A component registry describes, per component, where its sources come
//! from (apt repositories and PPAs, plain URLs, python and ruby package
//! indices) and how to turn them into a package (config templates,
//! bootstrap scripts, `fpm` source and destination types).
//!
//! - [`pipeline::get`] acquires a component's sources into its sources
//!   directory.
//! - [`pipeline::pack`] renders config files and bootstrap scripts into the
//!   build tree and packages it with `fpm`.
//!
//! # Architecture
//!
//! ```text
//! pipeline (get, pack)
//!     │
//!     ├── component::resolve   required / optional / defaulted fields
//!     ├── handlers             apt, downloads, python, ruby, filesystem
//!     ├── template             minijinja rendering
//!     │
//!     └── process::Runner      every external command, with retries
//! ```
//!
//! Everything a run needs travels in an explicit [`PackContext`]: the
//! [`Runner`], the base directory relative paths resolve against, the
//! templates directory and the [`LogContext`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use packman::{Executor, LogContext, PackContext, Privilege, Registry, RetryPolicy};
//!
//! let log = LogContext::new(false);
//! let runner = Arc::new(Executor::new(RetryPolicy::default(), Privilege::Auto, log.clone()));
//! let ctx = PackContext::new(runner, PathBuf::from("."), PathBuf::from("package-templates"), log);
//!
//! let registry = Registry::load("packages.toml".as_ref())?;
//! packman::get(registry.get("nginx")?, "nginx", &ctx)?;
//! packman::pack(registry.get("nginx")?, "nginx", &ctx)?;
//! ```

pub mod component;
pub mod context;
pub mod error;
pub mod handlers;
pub mod log;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod settings;
pub mod template;

pub use component::{ComponentConfig, ConfigTemplateEntry, Registry};
pub use context::PackContext;
pub use error::{Error, ErrorKind, Result};
pub use log::LogContext;
pub use pipeline::{get, make, pack, AcquireReport, GetOutcome, PackOutcome};
pub use process::{Cmd, ExecutionResult, Executor, Privilege, RetryPolicy, Runner};
pub use settings::Settings;
