//! RustyVCS - Atari 2600 video chip, frame timing and audio core
//!
//! The [`tia::Tia`] is stepped one colour clock at a time by the
//! [`system::System`], which routes the accesses of an external CPU core.
//! The [`console::Console`] adds display format autodetection, palettes,
//! snapshots and the audio queue that the playback side drains through
//! [`audio::AudioSystem`].

pub mod audio;
pub mod cartridge;
pub mod console;
pub mod frame;
pub mod kernel;
pub mod savestate;
pub mod settings;
pub mod system;
pub mod tia;
pub mod timing;
pub mod util;

pub use cartridge::Cartridge;
pub use console::Console;
pub use frame::{ConsoleTiming, DisplayFormat, FrameLayout};
pub use kernel::DisplayKernel;
pub use savestate::Serializer;
pub use settings::Settings;
pub use system::{Bus, Cpu, System};
pub use tia::Tia;
