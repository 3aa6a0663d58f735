mod request;
pub use request::{
    AnnotationFormat, ControllerRequest, MergeStrategy, RequestPayload, RequestType,
    TerminateKind, UnknownTypesStrategy,
};

mod response;
pub use response::{Response, ResponseExt};
