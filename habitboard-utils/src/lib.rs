/// Environment variable parsing helpers.
pub mod env;
/// Document path patterns with `{name}` wildcards.
pub mod path;
