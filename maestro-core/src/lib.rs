//! Maestro core library — profile model, normalization, settings, errors.
//!
//! Public API surface:
//! - [`types`] — profile blocks, registry listings, identities
//! - [`profile`] — load / substitute / validate, [`profile::SourceCheck`]
//! - [`settings`] — `~/.maestro/settings.yaml` store
//! - [`text`] — normalization and masking helpers
//! - [`error`] — [`ProfileError`], [`SettingsError`]

pub mod error;
pub mod profile;
pub mod settings;
pub mod text;
pub mod types;

pub use error::{ProfileError, SettingsError};
pub use settings::Settings;
pub use types::{
    CodeDef, CodeEntry, CodeListing, CommandKind, ComputerDef, ComputerListing,
    ComputerSetup, CustomCommand, CustomCommands, InstanceId, Label, Pk, Profile,
    RemoteCommands, ResourceKind, TransportConfig, UNSELECTED,
};
