use async_trait::async_trait;
use mirctl_model::{ControllerRequest, Response};

use crate::error::ApiError;

/// Backend behind the controller API.
///
/// [`crate::DispatcherAdapter`] is the stock implementation; wrap it to add auth or rate limits.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Handle one controller request. `Ok` carries the controller's response whatever its code.
    async fn invoke(&self, req: ControllerRequest) -> Result<Response, ApiError>;
}
