//! Command-line interface module.

mod args;

pub use args::{Cli, Commands, TargetArgs};

use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use std::sync::Arc;

use crate::config::CombinerConfig;
use crate::resource::EmbeddedSource;
use crate::vary::RequestContext;
use crate::workflow::{Engine, Outcome, ProcessRequest};
use crate::{log, serve};

/// Run the parsed command.
pub fn run(cli: &Cli) -> Result<()> {
    let mut config = CombinerConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match &cli.command {
        Commands::Serve {
            interface,
            port,
            watch,
        } => {
            if let Some(interface) = interface {
                config.serve.interface = *interface;
            }
            if let Some(port) = port {
                config.serve.port = *port;
            }
            if let Some(watch) = watch {
                config.serve.watch = *watch;
            }
            let section = config.serve.clone();
            let engine = Arc::new(load_engine(config)?);
            serve::bind(&section)?.run(engine)
        }
        Commands::Url { target } => print_url(&load_engine(config)?, target),
        Commands::Build {
            target,
            accept_encoding,
        } => build(&load_engine(config)?, target, accept_encoding),
    }
}

fn load_engine(config: CombinerConfig) -> Result<Engine> {
    Ok(config.into_engine(Arc::new(EmbeddedSource::new()))?)
}

fn context(target: &TargetArgs) -> RequestContext {
    target
        .headers
        .iter()
        .fold(RequestContext::new(), |cx, (name, value)| {
            cx.with_header(name, value.as_str())
        })
}

/// Combined URL, or one line per resource for sets in debug bypass.
fn print_url(engine: &Engine, target: &TargetArgs) -> Result<()> {
    let set = engine
        .sets()
        .get(&target.set)
        .with_context(|| format!("unknown resource set `{}`", target.set))?;

    let mut stdout = io::stdout().lock();
    if set.is_pipeline_bypassed() {
        for resource in engine.debug_listing(&target.set)?.resources {
            writeln!(stdout, "{}", resource.url)?;
        }
    } else {
        writeln!(stdout, "{}", engine.resolve_url(&target.set, &context(target))?)?;
    }
    Ok(())
}

fn build(engine: &Engine, target: &TargetArgs, accept_encoding: &str) -> Result<()> {
    let cx = context(target);
    if engine
        .sets()
        .get(&target.set)
        .is_some_and(|set| set.is_pipeline_bypassed())
    {
        bail!("`{}` is in debug mode and is not combined", target.set);
    }

    let version = engine.current_version(&target.set, &cx)?;
    let request = ProcessRequest::new(target.set.as_str(), version)
        .context(cx)
        .accept_encoding(accept_encoding);
    let Outcome::Artifact(served) = engine.process(&request)? else {
        bail!("`{}` produced no artifact", target.set);
    };

    let artifact = &served.artifact;
    log!(
        "build";
        "{} [{}] {} bytes, {}",
        target.set,
        artifact.version,
        artifact.content.len(),
        artifact.encoding
    );
    let mut stdout = io::stdout().lock();
    stdout.write_all(&artifact.content)?;
    stdout.flush()?;
    Ok(())
}
