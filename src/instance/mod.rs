//! Instance registry and lifecycle operations.

mod crud;
mod defaults;
mod lifecycle;
mod types;

pub use crud::{add_instance, delete_instance, list_instances, update_instance};
pub use defaults::default_instance;
pub use lifecycle::{
    open_instance_url, start_instance, start_instances, stop_instance, stop_instances,
};
pub use types::{BatchOutcome, InstanceStatus};
