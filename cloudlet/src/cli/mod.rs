pub mod bugreport;
pub mod client;
pub mod server;
pub mod token;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the server";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment that can be used in bug reports";

pub const TOKEN_SUBCOMMAND: &str = "token";
pub const TOKEN_DESCRIPTION: &str = "Issue a session token for a user (development only)";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str = "Upload a local file into a folder";

pub const MKDIR_SUBCOMMAND: &str = "mkdir";
pub const MKDIR_DESCRIPTION: &str = "Create a folder";

pub const LS_SUBCOMMAND: &str = "ls";
pub const LS_DESCRIPTION: &str = "List files and folders under a folder";

pub const RM_SUBCOMMAND: &str = "rm";
pub const RM_DESCRIPTION: &str = "Delete a file and its stored object";

pub const RMDIR_SUBCOMMAND: &str = "rmdir";
pub const RMDIR_DESCRIPTION: &str = "Delete a folder, leaving its content in place";

pub const DEFAULT_URI: &str = "http://localhost:5000";
