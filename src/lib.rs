pub mod artifact;
pub mod config;
pub mod dates;
pub mod email;
pub mod engine;
pub mod gateway;
pub mod matcher;
pub mod pagination;
pub mod report;
pub mod runner;
pub mod statistics;
pub mod usage;

pub use config::{Config, ConfigFile, Retention, Rule};
pub use email::Email;
pub use engine::{ActionRecord, ActionTag, FailedAction, ResolutionEngine};
pub use gateway::{GatewayError, GwsaGateway, MailboxGateway, MemoryGateway, SimulatedGateway};
pub use matcher::RuleMatcher;
pub use pagination::PageWalker;
pub use statistics::{RuleStat, StatsAccumulator};
