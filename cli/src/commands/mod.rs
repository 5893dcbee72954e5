mod entry;
mod helpers;
mod settings;
mod status;
mod sync;
mod transfer;

pub(crate) use entry::{EntryField, EntryFields, cmd_delete, cmd_history, cmd_log, cmd_show};
pub(crate) use helpers::today;
pub(crate) use settings::{cmd_settings_reset, cmd_settings_set, cmd_settings_show};
pub(crate) use status::{cmd_chart, cmd_status};
pub(crate) use sync::{cmd_remote_login, cmd_remote_logout, cmd_remote_status, cmd_sync};
pub(crate) use transfer::{cmd_export, cmd_import, cmd_wipe};
