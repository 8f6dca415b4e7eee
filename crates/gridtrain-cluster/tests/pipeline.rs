//! End-to-end walk of the operator loop against stub scheduler binaries:
//! render a script, submit it, watch the queue drain, grep the log.

use std::fs;
use std::path::Path;
use std::time::Duration;

use gridtrain_cluster::job::script;
use gridtrain_cluster::job::{DataPaths, JobConfig, ModelConfig};
use gridtrain_cluster::logs::{LogQuery, Marker};
use gridtrain_cluster::progress::CancelFlag;
use gridtrain_cluster::scheduler::{JobId, Slurm, WaitOutcome, WatchOptions};

fn classroom_config(dir: &Path) -> JobConfig {
    JobConfig {
        run_name: "log_2Nodes4GPUS".to_string(),
        nodes: 2,
        gpus_per_node: 2,
        cpus_per_task: 32,
        tensor_parallel: 1,
        pipeline_parallel: 1,
        micro_batch_size: 32,
        global_batch_size: 128,
        train_iters: 100,
        master_port: 6000,
        model: ModelConfig {
            num_layers: 12,
            hidden_size: 768,
            num_heads: 32,
            seq_length: 1024,
            vocab_size: 50257,
        },
        paths: DataPaths {
            vocab_file: dir.join("gpt2-vocab.json").display().to_string(),
            merge_file: dir.join("gpt2-merges.txt").display().to_string(),
            data_path: dir.join("my-gpt2_text_document").display().to_string(),
            checkpoint_dir: dir.join("checkpoints").display().to_string(),
            tensorboard_dir: dir.join("tensorboard").display().to_string(),
            log_dir: dir.join("logs").display().to_string(),
        },
        optimizer: Default::default(),
        output: Default::default(),
    }
}

#[cfg(unix)]
fn stub_binary(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[test]
fn render_write_and_inspect_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = classroom_config(dir.path());

    let rendered = script::render(&config).unwrap();
    let script_path = dir.path().join("pretrain_gpt_2Node4GPU.sh");
    fs::write(&script_path, &rendered).unwrap();

    // Deterministic: re-rendering matches what was written.
    assert_eq!(fs::read_to_string(&script_path).unwrap(), script::render(&config).unwrap());

    // Simulate the job appending to its combined log.
    fs::create_dir_all(dir.path().join("logs")).unwrap();
    fs::write(
        config.log_file(),
        "using world size: 4\n[iteration 10] loss=4.2\n[iteration 20] loss=3.9\ndone\n",
    )
    .unwrap();

    let query = LogQuery::new(config.log_file());
    assert_eq!(query.matching_marker(Marker::WorldSize).unwrap().count(), 1);
    let iterations: Vec<_> = query.matching_marker(Marker::Iteration).unwrap().collect();
    assert_eq!(iterations.len(), 2);
    assert!(iterations[0].contains("loss=4.2"));
    assert!(!query.has_runtime_error().unwrap());
}

#[cfg(unix)]
#[test]
fn submit_and_watch_with_stub_scheduler() {
    let dir = tempfile::tempdir().unwrap();

    let sbatch = stub_binary(dir.path(), "sbatch", "echo Submitted batch job 4271");
    // First squeue call shows the job running; the marker file makes every
    // later call report an empty queue, as if the job finished.
    let flag = dir.path().join("polled-once");
    let squeue = stub_binary(
        dir.path(),
        "squeue",
        &format!(
            "if [ -e {flag} ]; then exit 0; fi\ntouch {flag}\necho '4271 dli_2nodes R 0:42 slurmnode1'",
            flag = flag.display()
        ),
    );
    let scancel = stub_binary(dir.path(), "scancel", "exit 0");

    let slurm = Slurm::with_binaries(sbatch, squeue, scancel);

    let script_path = dir.path().join("job.sh");
    fs::write(&script_path, "#!/bin/bash\n").unwrap();
    let id = slurm.submit(&script_path).unwrap();
    assert_eq!(id, JobId(4271));

    let options = WatchOptions {
        poll_interval: Duration::from_millis(1),
        deadline: Some(Duration::from_secs(5)),
    };
    let outcome = slurm
        .watch("student", id, &options, &CancelFlag::new(), None)
        .unwrap();
    assert_eq!(outcome, WaitOutcome::Finished);

    slurm.cancel_user("student").unwrap();
}

#[cfg(unix)]
#[test]
fn submission_rejection_is_a_scheduler_error() {
    let dir = tempfile::tempdir().unwrap();
    let sbatch = stub_binary(
        dir.path(),
        "sbatch",
        "echo 'sbatch: error: invalid partition' >&2; exit 1",
    );
    let slurm = Slurm::with_binaries(sbatch, "squeue".into(), "scancel".into());

    let script_path = dir.path().join("job.sh");
    fs::write(&script_path, "#!/bin/bash\n").unwrap();

    let err = slurm.submit(&script_path).unwrap_err();
    assert!(err.to_string().contains("invalid partition"));
}
