pub mod error;
pub mod fetch;
pub mod interpret;
pub mod lifecycle;
pub mod mock;
pub mod scheduler;
pub mod sync;
pub mod traits;
pub mod types;
pub mod wellknown;

pub use error::*;
pub use fetch::*;
pub use interpret::*;
pub use lifecycle::*;
pub use mock::*;
pub use scheduler::*;
pub use sync::*;
pub use traits::*;
pub use types::*;
pub use wellknown::*;
