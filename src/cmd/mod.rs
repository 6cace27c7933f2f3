//! CLI command implementations.
//!
//! | Module    | Commands handled                        |
//! |-----------|-----------------------------------------|
//! | `project` | `Init`, `New`                           |
//! | `task`    | `List`, `Status`, `Attach`, `Logs`      |
//! | `run`     | `Run`                                   |
//! | `prune`   | `Prune`                                 |
//! | `config`  | `Config`                                |

pub mod config;
pub mod project;
pub mod prune;
pub mod run;
pub mod task;

pub use config::cmd_config;
pub use project::{cmd_init, cmd_new};
pub use prune::cmd_prune;
pub use run::cmd_run;
pub use task::{cmd_attach, cmd_list, cmd_logs, cmd_status};
