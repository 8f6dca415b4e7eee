use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand, ValueHint};
use colored::Colorize;
use gridtrain_cluster::deploy::GenerationParams;

use crate::context::CliContext;

#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(subcommand)]
    pub command: DeployCommand,
}

#[derive(Subcommand, Debug)]
pub enum DeployCommand {
    /// Convert a training checkpoint for a target inference GPU count
    Convert {
        /// Training checkpoint directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        checkpoint: PathBuf,
        /// Output directory for the converted checkpoint
        #[arg(long, value_hint = ValueHint::DirPath)]
        output: PathBuf,
        /// Inference parallelism degree the layout is converted for
        #[arg(long = "n-gpus")]
        n_gpus: u32,
    },
    /// Launch the inference server over a model repository
    Serve {
        #[arg(long, value_hint = ValueHint::DirPath)]
        model_repository: PathBuf,
    },
    /// Send one prompt through the running server
    Infer {
        prompt: String,
        #[arg(long, default_value_t = 128)]
        output_len: u32,
        #[arg(long, default_value_t = 1)]
        beam_width: u32,
        #[arg(long, default_value_t = 1)]
        top_k: u32,
        #[arg(long, default_value_t = 0.0)]
        top_p: f32,
        #[arg(long, default_value_t = 1.0)]
        temperature: f32,
    },
}

pub(crate) fn handle_command(args: DeployArgs, context: CliContext) -> anyhow::Result<()> {
    match args.command {
        DeployCommand::Convert {
            checkpoint,
            output,
            n_gpus,
        } => convert(&context, checkpoint, output, n_gpus),
        DeployCommand::Serve { model_repository } => serve(&context, model_repository),
        DeployCommand::Infer {
            prompt,
            output_len,
            beam_width,
            top_k,
            top_p,
            temperature,
        } => {
            let params = GenerationParams {
                output_len,
                beam_width,
                top_k,
                top_p,
                temperature,
                ..GenerationParams::default()
            };
            infer(&context, &prompt, &params)
        }
    }
}

fn convert(
    context: &CliContext,
    checkpoint: PathBuf,
    output: PathBuf,
    n_gpus: u32,
) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Convert checkpoint");

    let spinner = terminal.spinner();
    spinner.start(format!(
        "Converting {} for {} inference GPU(s)...",
        checkpoint.display(),
        n_gpus
    ));

    context
        .converter()
        .convert(&checkpoint, &output, n_gpus)
        .inspect_err(|_| spinner.error("Conversion failed"))
        .context("checkpoint conversion failed")?;

    spinner.stop(format!("Converted checkpoint written to {}", output.display()));
    terminal.finalize("Checkpoint ready for serving.");
    Ok(())
}

fn serve(context: &CliContext, model_repository: PathBuf) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Serve model");

    let handle = context
        .server_launcher()
        .launch(&model_repository)
        .context("failed to start the inference server")?;

    terminal.print_success(&format!(
        "Inference server running (pid {})",
        handle.pid().to_string().bold()
    ));
    terminal.finalize(&format!(
        "Send a request with: gridtrain deploy infer \"<prompt>\" (endpoint {})",
        context.settings().endpoint
    ));

    // Dropping the handle leaves the server running for the rest of the
    // session; the operator terminates it by pid when done.
    drop(handle);
    Ok(())
}

fn infer(context: &CliContext, prompt: &str, params: &GenerationParams) -> anyhow::Result<()> {
    let terminal = context.terminal();
    terminal.command_title("Infer");

    let client = context.inference_client();
    let spinner = terminal.spinner();
    spinner.start(format!("Querying {}...", client.infer_url()));

    let generation = client
        .infer(prompt, params)
        .inspect_err(|_| spinner.error("Inference request failed"))
        .context("inference request failed")?;

    spinner.stop(format!("Generated {} token(s)", generation.token_ids.len()));
    println!("{:?}", generation.token_ids);
    terminal.finalize("Inference completed.");

    Ok(())
}
