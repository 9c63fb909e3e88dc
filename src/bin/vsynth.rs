//! vsynth command-line driver.
//!
//! Builds one of the benchmark kernels and prints an intermediate artifact,
//! or compiles and loads it.

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use vsynth::codegen::emit_shims;
use vsynth::{
    BuildConfig, CompilationSession, CompileResult, DryRunOracle, Kernel, Module, RacketOracle,
    SynthesisOracle,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KernelArg {
    VecAdd,
    VecAddConst,
    ScaAdd,
    VecAdd2d,
    Reduction,
}

impl From<KernelArg> for Kernel {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::VecAdd => Kernel::VecAdd,
            KernelArg::VecAddConst => Kernel::VecAddConst,
            KernelArg::ScaAdd => Kernel::ScaAdd,
            KernelArg::VecAdd2d => Kernel::VecAdd2d,
            KernelArg::Reduction => Kernel::Reduction,
        }
    }
}

/// What to print (or produce) after the kernel is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// IR after optimization
    Ir,
    /// Host C source
    #[default]
    Source,
    /// Symbolic specifications sent to the oracle
    Spec,
    /// LLVM ABI shim
    Shim,
    /// Tool invocations of the build
    Plan,
    /// Compile and load the shared object
    So,
}

#[derive(Parser)]
#[command(name = "vsynth")]
#[command(about = "Synthesis-aware backend for lowered tensor kernels", long_about = None)]
struct Cli {
    /// Kernel to build
    #[arg(short, long, default_value = "vec-add")]
    kernel: KernelArg,

    /// Offer vector expressions to the synthesis oracle
    #[arg(short, long)]
    synthesize: bool,

    /// Run the real oracle instead of accepting every request
    #[arg(long, requires = "synthesize")]
    oracle: bool,

    /// Lane width of the vectorized loop
    #[arg(short, long, default_value_t = 4)]
    lanes: u32,

    /// Artifact to print
    #[arg(short, long, default_value = "source")]
    emit: Emit,

    /// Directory for generated files (overrides TACO_TMPDIR)
    #[arg(long, value_name = "DIR")]
    tmpdir: Option<PathBuf>,

    /// Debug build flags
    #[arg(long)]
    debug: bool,

    /// Emit OpenMP pragmas
    #[arg(long)]
    openmp: bool,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> CompileResult<()> {
    let mut config = BuildConfig::from_env()
        .with_debug(cli.debug)
        .with_openmp(cli.openmp);
    if let Some(dir) = &cli.tmpdir {
        config = config.with_tmpdir(dir);
    }

    let arena = Bump::new();
    let session = CompilationSession::with_seed(&arena, config.seed);
    let mut real_oracle = RacketOracle::new(config.oracle.clone());
    let mut dry_oracle = DryRunOracle::default();

    let mut module = Module::new(&session, config);
    let kernel = Kernel::from(cli.kernel);
    let function = kernel.build(module.ir_mut(), cli.lanes);
    module.add_function(function)?;

    let oracle: Option<&mut dyn SynthesisOracle> = match (cli.synthesize, cli.oracle) {
        (false, _) => None,
        (true, true) => Some(&mut real_oracle),
        (true, false) => Some(&mut dry_oracle),
    };
    module.compile_to_source(oracle)?;

    match cli.emit {
        Emit::Ir => println!("{}", module.print_ir()),
        Emit::Source => print!("{}", module.source()),
        Emit::Spec => {
            for request in module.requests() {
                println!(";; {}\n{}", request.spec_path().display(), request.spec);
            }
        }
        Emit::Shim => match module.shim() {
            Some(shim) => print!("{}", shim.text),
            None => print!("{}", emit_shims(module.ir(), module.functions(), "empty_shim.ll")?.text),
        },
        Emit::Plan => print!("{}", module.build_plan()?),
        Emit::So => {
            module.compile()?;
            println!("{}", module.paths().shared_object().display());
        }
    }
    log::info!("{} ({}): {}", kernel, module.library_name(), session.stats());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
