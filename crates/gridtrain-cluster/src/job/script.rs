//! Sbatch script rendering
//!
//! Turns a validated [`JobConfig`] into the submission script text the
//! scheduler consumes. Rendering is pure: same config in, byte-identical
//! script out. The master address is resolved at run time inside the script
//! through `scontrol`, since only the scheduler knows the allocated nodes.

use std::fmt::Write;

use super::{JobConfig, JobConfigError};

/// Render the full sbatch submission script for a job.
///
/// Validates the config first so an incomplete or inconsistent record can
/// never produce a broken script.
pub fn render(config: &JobConfig) -> Result<String, JobConfigError> {
    config.validate()?;
    Ok(render_unchecked(config))
}

fn render_unchecked(config: &JobConfig) -> String {
    let mut out = String::with_capacity(4096);
    let opt = &config.optimizer;
    let model = &config.model;
    let paths = &config.paths;

    // Infallible: writing to a String cannot fail.
    let _ = write!(
        out,
        "#!/bin/bash\n\
         #SBATCH --job-name={job_name}\n\
         #SBATCH --nodes={nodes}\n\
         #SBATCH --ntasks-per-node=1\n\
         #SBATCH --cpus-per-task={cpus}\n\
         #SBATCH -o {log_dir}/%j.out\n\
         #SBATCH -e {log_dir}/%j.err\n\
         \n\
         set -x -e\n\
         \n\
         export OMP_NUM_THREADS=$SLURM_CPUS_PER_TASK\n\
         \n\
         NNODES={nodes}\n\
         GPUS_PER_NODE={gpus_per_node}\n\
         TP_SIZE={tp}\n\
         PP_SIZE={pp}\n\
         \n\
         MASTER_ADDR=$(scontrol show hostnames $SLURM_JOB_NODELIST | head -n 1)\n\
         MASTER_PORT={master_port}\n\
         \n\
         MICRO_BATCH_SIZE={micro}\n\
         GLOBAL_BATCH_SIZE={global}\n\
         \n\
         NLAYERS={layers}\n\
         NHIDDEN={hidden}\n\
         NHEADS={heads}\n\
         SEQ_LEN={seq_len}\n\
         VOCAB_SIZE={vocab_size}\n\
         \n\
         CHECKPOINT_PATH={checkpoint_dir}\n\
         TENSORBOARD_PATH={tensorboard_dir}\n\
         LOGS_PATH={log_dir}\n\
         VOCAB_FILE={vocab_file}\n\
         MERGE_FILE={merge_file}\n\
         DATA_PATH={data_path}\n\
         \n\
         NAME=\"{job_name}\"\n",
        job_name = config.run_name,
        nodes = config.nodes,
        cpus = config.cpus_per_task,
        gpus_per_node = config.gpus_per_node,
        tp = config.tensor_parallel,
        pp = config.pipeline_parallel,
        master_port = config.master_port,
        micro = config.micro_batch_size,
        global = config.global_batch_size,
        layers = model.num_layers,
        hidden = model.hidden_size,
        heads = model.num_heads,
        seq_len = model.seq_length,
        vocab_size = model.vocab_size,
        checkpoint_dir = paths.checkpoint_dir,
        tensorboard_dir = paths.tensorboard_dir,
        log_dir = paths.log_dir,
        vocab_file = paths.vocab_file,
        merge_file = paths.merge_file,
        data_path = paths.data_path,
    );

    let _ = write!(
        out,
        "\n\
         OPTIMIZER_ARGS=\" \\\n\
         \x20   --optimizer adam \\\n\
         \x20   --adam-beta1 {beta1} \\\n\
         \x20   --adam-beta2 {beta2} \\\n\
         \x20   --adam-eps {eps:e} \\\n\
         \x20   --lr {lr:e} \\\n\
         \x20   --min-lr {min_lr:e} \\\n\
         \x20   --lr-decay-style {decay_style} \\\n\
         \x20   --lr-decay-iters {decay_iters} \\\n\
         \x20   --lr-warmup-fraction {warmup} \\\n\
         \x20   --clip-grad {clip} \\\n\
         \x20   --weight-decay {decay} \\\n\
         \x20   --exit-duration-in-mins {exit_mins} \\\n\
         \x20   \"\n",
        beta1 = opt.adam_beta1,
        beta2 = opt.adam_beta2,
        eps = opt.adam_eps,
        lr = opt.lr,
        min_lr = opt.min_lr,
        decay_style = opt.lr_decay_style,
        decay_iters = opt.lr_decay_iters,
        warmup = opt.lr_warmup_fraction,
        clip = opt.clip_grad,
        decay = opt.weight_decay,
        exit_mins = opt.exit_duration_mins,
    );

    let _ = write!(
        out,
        "\n\
         GPT_ARGS=\" \\\n\
         \x20   --num-layers $NLAYERS \\\n\
         \x20   --hidden-size $NHIDDEN \\\n\
         \x20   --num-attention-heads $NHEADS \\\n\
         \x20   --seq-length $SEQ_LEN \\\n\
         \x20   --max-position-embeddings $SEQ_LEN \\\n\
         \x20   --micro-batch-size $MICRO_BATCH_SIZE \\\n\
         \x20   --global-batch-size $GLOBAL_BATCH_SIZE \\\n\
         \x20   --train-iters {train_iters} \\\n\
         \x20   --vocab-file $VOCAB_FILE \\\n\
         \x20   --merge-file $MERGE_FILE \\\n\
         \x20   --init-method-std 0.006 \\\n\
         \x20   $OPTIMIZER_ARGS \\\n\
         \x20   \"\n",
        train_iters = config.train_iters,
    );

    let _ = write!(
        out,
        "\n\
         OUTPUT_ARGS=\" \\\n\
         \x20   --log-interval {log_interval} \\\n\
         \x20   --save-interval {save_interval} \\\n\
         \x20   --eval-interval {eval_interval} \\\n\
         \x20   --eval-iters {eval_iters} \\\n\
         \x20   --tensorboard-dir $TENSORBOARD_PATH \\\n\
         \x20   --tensorboard-queue-size 1 \\\n\
         \x20   --log-timers-to-tensorboard \\\n\
         \x20   --log-batch-size-to-tensorboard \\\n\
         \x20   --log-validation-ppl-to-tensorboard \\\n\
         \x20   \"\n",
        log_interval = config.output.log_interval,
        save_interval = config.output.save_interval,
        eval_interval = config.output.eval_interval,
        eval_iters = config.output.eval_iters,
    );

    out.push_str(
        "\n\
         export LAUNCHER=\"python -u -m torch.distributed.launch \\\n\
         \x20   --nproc_per_node $GPUS_PER_NODE \\\n\
         \x20   --nnodes $NNODES \\\n\
         \x20   --master_addr $MASTER_ADDR \\\n\
         \x20   --master_port $MASTER_PORT \\\n\
         \x20   \"\n\
         \n\
         export CMD=\" \\\n\
         \x20   pretrain_gpt.py \\\n\
         \x20   --tensor-model-parallel-size $TP_SIZE \\\n\
         \x20   --pipeline-model-parallel-size $PP_SIZE \\\n\
         \x20   $GPT_ARGS \\\n\
         \x20   $OUTPUT_ARGS \\\n\
         \x20   --save $CHECKPOINT_PATH \\\n\
         \x20   --data-path $DATA_PATH \\\n\
         \x20   --data-impl mmap \\\n\
         \x20   --split 949,50,1 \\\n\
         \x20   --distributed-backend nccl \\\n\
         \x20   \"\n\
         \n\
         srun --jobid $SLURM_JOBID bash -c 'NCCL_DEBUG=INFO $LAUNCHER --node_rank $SLURM_PROCID $CMD' 2>&1 | tee -a $LOGS_PATH/$NAME.txt\n",
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::sample_config;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_is_deterministic() {
        let config = sample_config();
        let first = render(&config).unwrap();
        let second = render(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_contains_sbatch_directives() {
        let script = render(&sample_config()).unwrap();
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#SBATCH --nodes=2\n"));
        assert!(script.contains("#SBATCH --cpus-per-task=32\n"));
        assert!(script.contains("#SBATCH -o /dli/megatron/logs/%j.out\n"));
        assert!(script.contains("#SBATCH -e /dli/megatron/logs/%j.err\n"));
    }

    #[test]
    fn test_render_exports_parallelism_and_batches() {
        let script = render(&sample_config()).unwrap();
        assert!(script.contains("TP_SIZE=1\n"));
        assert!(script.contains("PP_SIZE=1\n"));
        assert!(script.contains("MICRO_BATCH_SIZE=32\n"));
        assert!(script.contains("GLOBAL_BATCH_SIZE=128\n"));
        assert!(script.contains("MASTER_PORT=6000\n"));
        assert!(script.contains("--tensor-model-parallel-size $TP_SIZE"));
        assert!(script.contains("--pipeline-model-parallel-size $PP_SIZE"));
    }

    #[test]
    fn test_render_formats_optimizer_floats() {
        let script = render(&sample_config()).unwrap();
        assert!(script.contains("--lr 6e-5"));
        assert!(script.contains("--min-lr 6e-6"));
        assert!(script.contains("--adam-eps 1e-8"));
        assert!(script.contains("--lr-decay-style cosine"));
        assert!(script.contains("--lr-warmup-fraction 0.01"));
    }

    #[test]
    fn test_render_pipes_combined_log_through_tee() {
        let script = render(&sample_config()).unwrap();
        assert!(script.contains("NAME=\"log_2Nodes4GPUS\"\n"));
        assert!(script.ends_with("tee -a $LOGS_PATH/$NAME.txt\n"));
        assert!(script.contains("NCCL_DEBUG=INFO"));
    }

    #[test]
    fn test_render_rejects_invalid_config() {
        let mut config = sample_config();
        config.tensor_parallel = 3;
        assert!(render(&config).is_err());
    }
}
