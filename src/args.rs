use duration_string::DurationString;
use gumdrop::Options;

/// Deploy websites from git when their repository is pushed to.
#[derive(Debug, Options)]
pub struct Args {
    /// The site configuration files, one for every site.
    #[options(free)]
    pub sites: Vec<String>,

    /// The port (or address) to listen on for push notifications.
    #[options(default = "8000")]
    pub port: String,

    /// Deploy the live branch of the sites once, then exit.
    #[options(no_short)]
    pub live: bool,

    /// Deploy this branch to staging once, then exit.
    #[options(meta = "BRANCH")]
    pub stage: Option<String>,

    /// The exact revision to deploy with --live or --stage.
    #[options(no_short, meta = "SHA")]
    pub sha: Option<String>,

    /// Stop with an error if the deployments take longer than this.
    ///
    /// Can be a number postfixed with s(econd), m(inutes), h(ours), d(ays)
    #[options(no_short)]
    pub timeout: Option<DurationString>,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print the error messages.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
