//! Node parameters used as the bridge's side channel.

use depthai_bridge_core::SideChannel;
use eyre::Result;
use rclrs::{Node, ReadOnlyParameter};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Exposes registered values as read-only string parameters of a node,
/// e.g. `ros2 param get /depthai_publisher nn2depth1_1`.
pub struct Ros2ParameterChannel {
    node: Node,
    /// Declared parameters stay alive as long as their handles.
    parameters: Mutex<Vec<ReadOnlyParameter<Arc<str>>>>,
}

impl Ros2ParameterChannel {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            parameters: Mutex::new(Vec::new()),
        }
    }
}

impl SideChannel for Ros2ParameterChannel {
    fn register(&self, name: &str, value: String) -> Result<()> {
        let parameter = self
            .node
            .declare_parameter::<Arc<str>>(name)
            .default(Arc::from(value))
            .read_only()
            .map_err(|e| eyre::eyre!("Failed to declare parameter '{}': {}", name, e))?;

        info!(parameter = %name, "Declared read-only parameter");

        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(parameter);
        Ok(())
    }
}
