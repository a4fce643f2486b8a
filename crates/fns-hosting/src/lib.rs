//! `fns-hosting` — host assembly, lifecycle wiring, graceful shutdown and
//! the background cluster loop driver (spec §2: "Host assembly: lifecycle,
//! wiring, graceful shutdown, background cluster loop driver"), grounded on
//! `spark-hosting::host::Host` + `spark-hosting::shutdown::GracefulShutdownCoordinator`.

pub mod application;
pub mod discovery;
pub mod shutdown;
pub mod telemetry;

pub use application::{Application, ApplicationSettings};
pub use discovery::StaticDiscovery;
pub use shutdown::GracefulShutdownCoordinator;
