use svhn_cnn::backend::{MainAutoBackend, MainDevice};
use svhn_cnn::prelude::*;
use svhn_cnn::report;

fn run() -> Result<(), DataError> {
    let device = MainAutoBackend::main_device();
    log::info!("Using device {device:?}");

    let dataset_train = SvhnDataset::train()?;
    let dataset_test = SvhnDataset::test()?;

    let config = training_config();
    let training_report = train::<MainAutoBackend>(&config, device, dataset_train, dataset_test);

    let summary = report::render(&training_report);
    log::info!(
        "Evaluated {} images, accuracy {:.4}",
        summary.samples,
        summary.accuracy
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
