pub mod agent;
pub mod agents;
pub mod gateway;
pub mod onboard;
pub mod status;
