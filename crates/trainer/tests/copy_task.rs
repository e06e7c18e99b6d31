use calc_core::ModelConfig;
use tch::Device;
use trainer::{train_copy_task, CopyTask};

#[test]
fn copy_task_loss_decreases() {
    tch::manual_seed(42);
    let task = CopyTask {
        model: ModelConfig {
            src_vocab: 11,
            tgt_vocab: 11,
            n_layer: 2,
            d_model: 32,
            d_ff: 64,
            n_head: 4,
            dropout: 0.0,
            max_len: 64,
            layer_norm_epsilon: 1e-6,
        },
        batch_size: 30,
        train_batches: 20,
        eval_batches: 3,
        epochs: 4,
        learning_rate: 1.0,
        warmup: 50,
    };

    let report = train_copy_task(&task, Device::Cpu).unwrap();

    assert_eq!(report.train_losses.len(), 4);
    assert!(report.train_losses.iter().all(|l| l.is_finite()));
    let train = &report.train_losses;
    assert!(
        train[2] + train[3] < train[0] + train[1],
        "training loss did not go down: {:?}",
        train
    );
    assert!(train[3] < train[0], "training loss {:?}", train);

    assert_eq!(report.eval_losses.len(), 4);
    assert!(report.eval_losses.iter().all(|l| l.is_finite()));
    let first = report.eval_losses[0];
    let last = *report.eval_losses.last().unwrap();
    assert!(last < first, "eval loss went from {} to {}", first, last);

    assert_eq!(report.state.step, 4 * 20);
    assert_eq!(report.state.accum_step, 4 * 20);
    assert_eq!(report.decoded.size(), vec![1, 10]);
    assert_eq!(report.decoded.int64_value(&[0, 0]), 1);
}
