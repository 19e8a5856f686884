//! Tandem HA core
//!
//! Cluster resource orchestration over an external cluster manager: node
//! membership and standby control, and placement of colocated resource
//! groups through staged, atomically pushed configuration.

// Core modules
pub mod config;
pub mod logging;

// Cluster manager access
pub mod executor;
pub mod backend;

// Orchestration
pub mod agent;
pub mod framework;
pub mod controller;

pub use agent::{AgentState, Placement, ReconfigSession, ResourceAgent, ResourceGroupAgent};
pub use controller::ClusterController;
pub use framework::{ClusterFramework, FailoverState, HaFramework};
pub use tandem_common::{Error, Result};
