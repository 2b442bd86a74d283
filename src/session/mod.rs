//! Session lifecycle: controller, output pump, input forwarding.

mod controller;
mod decode;
mod events;
mod history;
mod input;
mod pump;
mod scrollback;
mod shared;
mod state;
mod stop;

pub use controller::SessionController;
pub use decode::Utf8Decoder;
pub use events::SessionEvent;
pub use history::{SessionHistory, SessionRecord};
pub use input::INPUT_ECHO_PREFIX;
pub use pump::{progress_for, STDERR_PREFIX};
pub use scrollback::{Scrollback, DEFAULT_CAPACITY};
pub use state::SessionState;
pub use stop::StopSignal;
