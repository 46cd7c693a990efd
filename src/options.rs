//! Options for the equivalence check.

use clap::{ArgEnum, Parser};

/// Implement [`Display`](std::fmt::Display) with the information in
/// [`clap::ArgEnum`].
///
/// This ensures consistent names for parsing of the default argument.
macro_rules! clap_display {
    ($t:ty) => {
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                use clap::ArgEnum as _;
                let value = self.to_possible_value().expect("no skipped variants");
                write!(f, "{}", value.get_name())
            }
        }
    };
}

/// The output format for the reduced miter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum OutputFormat {
    /// Do not write the reduced miter.
    #[clap(name = "none")]
    None,
    /// AIGER circuit in ASCII format.
    #[clap(name = "aag")]
    Aag,
    /// AIGER circuit in binary format.
    #[clap(name = "aig")]
    Aig,
}
impl Default for OutputFormat {
    fn default() -> Self {
        Self::None
    }
}
clap_display!(OutputFormat);

/// The trace level / verbosity for the logging framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
pub enum TraceLevel {
    /// Turn logging off.
    #[clap(name = "off")]
    Off,
    /// Only print errors.
    #[clap(name = "error")]
    Error,
    /// Print errors and warnings.
    #[clap(name = "warn")]
    Warn,
    /// Print errors, warnings and useful information.
    #[clap(name = "info")]
    Info,
    /// Print errors, warnings, useful and debug information.
    #[clap(name = "debug")]
    Debug,
    /// Print all information, including very verbose output.
    #[clap(name = "trace")]
    Trace,
}
impl Default for TraceLevel {
    fn default() -> Self {
        Self::Error
    }
}
clap_display!(TraceLevel);

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => Self::Off,
            TraceLevel::Error => Self::Error,
            TraceLevel::Warn => Self::Warn,
            TraceLevel::Info => Self::Info,
            TraceLevel::Debug => Self::Debug,
            TraceLevel::Trace => Self::Trace,
        }
    }
}

/// Options to control the iterative prove loop and its subordinate
/// engines.
///
/// These options can be used with [`check_with`](crate::check_with).
///
/// # Examples
///
/// ```
/// use athene::options::CheckOptions;
/// let options = CheckOptions {
///     iters_max: 3,
///     mitering_limit_start: 1000,
///     ..CheckOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Parser)]
pub struct CheckOptions {
    /// Disable the rewriting phase of each iteration.
    #[clap(
        long = "no-rewriting",
        parse(from_flag = std::ops::Not::not),
        help = "Disable AIG rewriting"
    )]
    pub use_rewriting: bool,
    /// Disable the functional-reduction phase of each iteration.
    #[clap(
        long = "no-fraiging",
        parse(from_flag = std::ops::Not::not),
        help = "Disable functional reduction (fraiging)"
    )]
    pub use_fraiging: bool,
    /// Number of iterations before the final SAT call.
    #[clap(
        long = "iterations",
        name = "iters",
        default_value_t = 6,
        help = "Number of prove iterations"
    )]
    pub iters_max: u32,
    /// Conflict budget of the SAT phase in the first iteration.
    #[clap(
        long = "miter-start",
        default_value_t = 5000,
        help = "Starting conflict budget for the SAT phase"
    )]
    pub mitering_limit_start: u64,
    /// Growth factor of the SAT-phase budget per iteration.
    #[clap(
        long = "miter-multi",
        default_value_t = 2.0,
        help = "Growth factor of the SAT budget per iteration"
    )]
    pub mitering_limit_multi: f64,
    /// Rewriting rounds in the first iteration.
    #[clap(
        long = "rewrite-start",
        default_value_t = 3,
        help = "Starting number of rewriting rounds"
    )]
    pub rewriting_limit_start: u32,
    /// Growth factor of the rewriting rounds per iteration.
    #[clap(
        long = "rewrite-multi",
        default_value_t = 1.0,
        help = "Growth factor of the rewriting rounds per iteration"
    )]
    pub rewriting_limit_multi: f64,
    /// Per-pair conflict budget of the FRAIG phase in the first iteration.
    #[clap(
        long = "fraig-start",
        default_value_t = 20,
        help = "Starting conflict budget per fraig candidate"
    )]
    pub fraiging_limit_start: u64,
    /// Growth factor of the FRAIG budget per iteration.
    #[clap(
        long = "fraig-multi",
        default_value_t = 8.0,
        help = "Growth factor of the fraig budget per iteration"
    )]
    pub fraiging_limit_multi: f64,
    /// Conflict budget of the final SAT call (0 = unlimited).
    #[clap(
        long = "miter-last",
        default_value_t = 1_000_000,
        help = "Conflict budget of the final SAT call"
    )]
    pub mitering_limit_last: u64,
    /// Hard cap on SAT conflicts across all phases (0 = unlimited).
    #[clap(
        long = "total-backtracks",
        default_value_t = 0,
        help = "Global limit on SAT conflicts"
    )]
    pub total_backtrack_limit: u64,
    /// Hard cap on clause inspections across all phases (0 = unlimited).
    #[clap(
        long = "total-inspects",
        default_value_t = 0,
        help = "Global limit on clause inspections"
    )]
    pub total_inspect_limit: u64,
    /// Emit a statistics line for every phase of every iteration.
    #[clap(short = 'v', long = "verbose", help = "Print per-phase statistics")]
    pub verbose: bool,
    /// Words of random simulation patterns used by the FRAIG engine.
    #[clap(
        long = "pats-random",
        default_value_t = 32,
        help = "Words of random simulation patterns"
    )]
    pub n_pats_random: usize,
    /// Words of counterexample patterns retained by the FRAIG engine.
    #[clap(
        long = "pats-dyna",
        default_value_t = 32,
        help = "Words of counterexample simulation patterns"
    )]
    pub n_pats_dyna: usize,
    /// Skip candidates whose function is unique under simulation.
    #[clap(
        long = "no-sparse",
        parse(from_flag = std::ops::Not::not),
        help = "Skip equivalence tests for sparse functions"
    )]
    pub do_sparse: bool,
    /// Let the FRAIG engine attempt the full miter at the end of each
    /// session.
    #[clap(long = "try-prove", help = "Attempt the full miter inside fraiging")]
    pub try_prove: bool,
    /// Record merged nodes as structural choices instead of removing
    /// them.
    #[clap(long = "choicing", help = "Record structural choices when fraiging")]
    pub choicing: bool,
    /// Refuse rewrites that would increase the output level.
    #[clap(long = "level-preserving", help = "Preserve the output level when rewriting")]
    pub preserve_levels: bool,
    /// Seed of the simulation pattern generator.
    #[clap(long = "seed", default_value_t = 24397, help = "Simulation seed")]
    pub seed: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            use_rewriting: true,
            use_fraiging: true,
            iters_max: 6,
            mitering_limit_start: 5000,
            mitering_limit_multi: 2.0,
            rewriting_limit_start: 3,
            rewriting_limit_multi: 1.0,
            fraiging_limit_start: 20,
            fraiging_limit_multi: 8.0,
            mitering_limit_last: 1_000_000,
            total_backtrack_limit: 0,
            total_inspect_limit: 0,
            verbose: false,
            n_pats_random: 32,
            n_pats_dyna: 32,
            do_sparse: true,
            try_prove: false,
            choicing: false,
            preserve_levels: false,
            seed: 24397,
        }
    }
}

/// A group of options used for parsing the arguments of the command-line
/// interface. For using this crate as a library, use
/// [`CheckOptions`] directly instead.
#[derive(Debug, Clone, Parser)]
#[clap(version, about = "A combinational equivalence checker for and-inverter graphs")]
pub struct CliOptions {
    /// The miter AIGER file, in ASCII or binary format.
    #[clap(name = "MITER")]
    pub input_file: String,
    /// Where to write the reduced miter on an equivalent verdict.
    #[clap(
        short = 'O',
        long = "output-file",
        help = "Write the reduced miter to the given file"
    )]
    pub output_file: Option<String>,
    /// The format for the reduced miter.
    #[clap(
        arg_enum,
        short = 'o',
        long = "output-format",
        name = "format",
        default_value_t,
        help = "Output format for the reduced miter"
    )]
    pub output_format: OutputFormat,
    /// The trace level to use for instantiating the logging framework.
    #[clap(
        arg_enum,
        short = 't',
        long = "trace",
        name = "trace-level",
        default_value_t,
        help = "Trace level"
    )]
    pub trace_level: TraceLevel,
    /// The set of options for the prove loop.
    #[clap(flatten)]
    pub check_options: CheckOptions,
}

impl From<&CliOptions> for CheckOptions {
    fn from(options: &CliOptions) -> Self {
        options.check_options.clone()
    }
}
