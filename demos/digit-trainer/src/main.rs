//! Trains the digit classifier on synthetic samples, then classifies a drawn stroke.
//!
//! Usage: `digit-trainer [artifact-dir] [request.json]`

use std::path::PathBuf;

use digitnet::config::Config;
use digitnet::tensor::Arena;
use digitnet::train::{install_file_logger, progress_channel, Interrupter};
use digitnet::{request_training, submit_drawing, ModelConfig, TrainingRequest};

const CANVAS: usize = 280;

fn main() {
    let mut args = std::env::args().skip(1);
    let artifact_dir = PathBuf::from(args.next().unwrap_or_else(|| "/tmp/digit-trainer".into()));
    let request = match args.next() {
        Some(path) => TrainingRequest::load(&path).expect("Request should be readable"),
        None => TrainingRequest::new(),
    };

    std::fs::create_dir_all(&artifact_dir).expect("Artifact dir should be created");
    install_file_logger(artifact_dir.join("experiment.log"));
    request
        .save(artifact_dir.join("request.json"))
        .expect("Request should be saved");

    let arena = Arena::new();
    let mut model = ModelConfig::digits()
        .init(&arena)
        .expect("Model should fit in memory");
    println!("Model with {} parameters", model.num_params());

    let (mut sender, receiver) = progress_channel(4);
    let interrupter = Interrupter::new();

    let trainer = std::thread::spawn(move || {
        let outcome = request_training(&mut model, &request, &mut sender, &interrupter);
        (model, outcome)
    });

    while let Ok(progress) = receiver.recv_blocking() {
        println!(
            "Epoch {}/{}: loss {:.4} accuracy {:.2}% validation {}",
            progress.epoch,
            progress.total_epochs,
            progress.loss,
            progress.accuracy * 100.0,
            progress
                .validation_accuracy
                .map(|accuracy| format!("{:.2}%", accuracy * 100.0))
                .unwrap_or_else(|| "-".into())
        );
    }

    let (model, outcome) = trainer.join().expect("Training thread should not panic");
    let outcome = outcome.expect("Training should succeed");
    println!("Training ended: {outcome:?}");

    let prediction = submit_drawing(&model, &stroke(), CANVAS, CANVAS)
        .expect("Drawing should be classified");
    println!("Predicted {prediction}, certainty {:?}", prediction.certainty());
    for entry in prediction.top_k(3) {
        println!("  #{} {} {}", entry.rank, entry.label, entry.confidence_percent());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&prediction.summary(3)).expect("Summary should serialize")
    );
}

/// A vertical white stroke on a black grayscale canvas.
fn stroke() -> Vec<u8> {
    let mut pixels = vec![0; CANVAS * CANVAS];
    for row in 60..220 {
        for col in 130..150 {
            pixels[row * CANVAS + col] = 255;
        }
    }
    pixels
}
