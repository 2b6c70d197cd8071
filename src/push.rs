mod dispatcher;
mod transport;
mod vapid;

pub use dispatcher::{DispatcherConfig, PushDispatcher};
pub use transport::{COLLAPSE_TOPIC, PushTransport, TransportError, WebPushTransport};
pub use vapid::{
    VapidConfig, VapidConfigStatus, VapidCredentials, generate_vapid_credentials,
    load_vapid_config,
};
