//! One module per subcommand, mirroring the Trigger API one call at a
//! time.

pub mod apply;
pub mod check;
pub mod configure;
pub mod force;
pub mod get_file;
pub mod status;
pub mod update_from_url;
