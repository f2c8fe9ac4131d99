// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use viewer_core::init_tracing;

mod config;
mod viewer;

use config::{AppCfg, Overrides, PresentModeCfg};
use viewer::ModelViewer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing is fine.
    #[arg(long, default_value = "viewer.toml")]
    config: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Load simple_shader.{vert,frag}.spv from here instead of the built-in shaders.
    #[arg(long)]
    shader_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    present_mode: Option<PresentModeCfg>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            width: self.width,
            height: self.height,
            shader_dir: self.shader_dir.clone(),
            present_mode: self.present_mode,
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = AppCfg::load(&args.config);
    cfg.apply(&args.overrides());
    info!(
        "starting {}x{} present_mode={:?} validation={}",
        cfg.window.width, cfg.window.height, cfg.render.present_mode, cfg.render.validation
    );

    let mut viewer = ModelViewer::new(&cfg)?;
    viewer.run()
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
