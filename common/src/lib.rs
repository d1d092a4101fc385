pub mod automation;
pub mod config;
pub mod connectivity;
pub mod control;
pub mod indicator;
pub mod input;
pub mod sensor;
pub mod telemetry;
pub mod types;

pub use automation::{AutomationEngine, RelayChange};
pub use config::{ControlTuning, DeviceConfig, NetworkConfig, RuntimeConfig};
pub use connectivity::{ConnectivityError, ConnectivityManager, NetworkBackend};
pub use control::{ControlLoop, DeviceState, TickEffects};
pub use indicator::LedSignal;
pub use input::InputDispatcher;
pub use sensor::{Reading, SensorReader, SensorSource, SimulatedSensor};
pub use telemetry::{TelemetryError, TelemetryRequest, TelemetryTracker};
pub use types::{
    ApiHealth, ButtonEvent, ButtonId, ConnectivityState, RelayId, RelayState, RelayTargets,
    RemoteDirectives, SensorSample, StatusPayload, FIRMWARE_VERSION, PRODUCT_NAME,
};
