use crate::output::{progress_message, OutputFormat, OutputFormatter};
use anyhow::Result;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use steg_core::core::models::ProgressCallback;
use steg_core::{
    ClassifierSet, ClassifierTrainer, CorpusBuilder, InferenceRunner, MediaKind, PipelineConfig, ProgressEvent, StegError,
    StepLoggerConfig,
};
use tracing::{debug, info};

/// Paths from `-f` or from the lines of `-t`; `None` when neither was given
pub fn collect_input_paths(filenames: Vec<PathBuf>, text_file: Option<&Path>) -> steg_core::Result<Option<Vec<PathBuf>>> {
    if !filenames.is_empty() {
        return Ok(Some(filenames));
    }

    let Some(list) = text_file else {
        return Ok(None);
    };
    if !list.is_file() {
        return Err(StegError::InvalidInput(format!("input list {} does not exist", list.display())));
    }

    let text = std::fs::read_to_string(list)?;
    let paths = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();
    Ok(Some(paths))
}

pub async fn classify_command(
    config: &PipelineConfig,
    filenames: Vec<PathBuf>,
    text_file: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = OutputFormatter::new(format);

    // Artifacts are checked before the input flags or list file are looked at
    if let Err(e) = ClassifierSet::ensure_present(config) {
        match &e {
            StegError::MissingArtifacts { missing } => {
                println!("Classifiers not found!");
                debug!("Missing artifacts in {}: {}", config.model_dir.display(), missing.join(", "));
                std::process::exit(1);
            }
            _ => exit_with_error(&formatter, &e, verbose),
        }
    }

    let paths = match collect_input_paths(filenames, text_file.as_deref()) {
        Ok(Some(paths)) => paths,
        Ok(None) => {
            eprint!("{}", formatter.format_warning("No input files: pass -f/--filenames or -t/--text-file"));
            std::process::exit(1);
        }
        Err(e) => exit_with_error(&formatter, &e, verbose),
    };

    let classifiers = match ClassifierSet::load(config) {
        Ok(set) => set,
        Err(e) => exit_with_error(&formatter, &e, verbose),
    };

    let spinner = spinner_for(&formatter, verbose, "Classifying files...");
    let mut runner = InferenceRunner::new(config, &classifiers)
        .with_step_logger(step_config(verbose))
        .with_progress(progress_callback(spinner.clone()));

    let report = match runner.run(&paths).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            exit_with_error(&formatter, &e, verbose);
        }
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    if let Err(e) = report.table.write_csv(&config.results_csv) {
        exit_with_error(&formatter, &e, verbose);
    }

    match format {
        OutputFormat::Text => {
            print!("{}", formatter.format_classification_table(&report.table));
            print!(
                "{}",
                formatter.format_success(&format!(
                    "Classification information also saved to {}",
                    config.results_csv.display()
                ))
            );
            print!("{}", formatter.format_failures(&report.failures));
            if verbose {
                print!("\n{}", runner.step_logger().format_summary());
            }
        }
        OutputFormat::Json => {
            println!("{}", formatter.format_classification_table(&report.table));
        }
    }

    Ok(())
}

pub async fn train_command(config: &PipelineConfig, dir: PathBuf, format: OutputFormat, verbose: bool) -> Result<()> {
    let formatter = OutputFormatter::new(format);

    if !dir.is_dir() {
        let err = StegError::InvalidInput(format!("training directory {} does not exist", dir.display()));
        exit_with_error(&formatter, &err, verbose);
    }

    print!("{}", formatter.format_banner("Extracting features"));
    let spinner = spinner_for(&formatter, verbose, "Extracting features...");
    let mut builder = CorpusBuilder::new(config)
        .with_step_logger(step_config(verbose))
        .with_progress(progress_callback(spinner.clone()));

    let corpus = match builder.build(&dir).await {
        Ok(corpus) => corpus,
        Err(e) => {
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            exit_with_error(&formatter, &e, verbose);
        }
    };
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    for media in [MediaKind::Image, MediaKind::Video] {
        let part = corpus.for_media(media);
        print!(
            "{}",
            formatter.format_info(&format!(
                "{}: {} stego, {} clean files; {} rows written to {}",
                media,
                part.stego.extracted,
                part.clean.extracted,
                part.table.len(),
                part.csv_path.display()
            ))
        );
    }
    print!("{}", formatter.format_failures(&corpus.failures));

    print!("{}", formatter.format_banner("Training classifiers"));
    let trainer = ClassifierTrainer::new(config);
    let outcomes = match tokio::task::spawn_blocking(move || trainer.train_all()).await? {
        Ok(outcomes) => outcomes,
        Err(e) => exit_with_error(&formatter, &e, verbose),
    };
    info!("Trained {} classifiers", outcomes.len());

    match format {
        OutputFormat::Text => {
            print!("{}", formatter.format_training_summary(&outcomes));
            print!(
                "{}",
                formatter.format_success(&format!("Classifiers saved to {}", config.model_dir.display()))
            );
            if verbose {
                print!("\n{}", builder.step_logger().format_summary());
            }
        }
        OutputFormat::Json => println!("{}", formatter.format_training_summary(&outcomes)),
    }

    Ok(())
}

fn step_config(verbose: bool) -> StepLoggerConfig {
    StepLoggerConfig {
        narrate_steps: verbose,
        ..Default::default()
    }
}

fn spinner_for(formatter: &OutputFormatter, verbose: bool, message: &str) -> Option<ProgressBar> {
    if !verbose && formatter.format() == OutputFormat::Text && atty::is(atty::Stream::Stderr) {
        Some(formatter.create_progress_bar(message))
    } else {
        None
    }
}

fn progress_callback(spinner: Option<ProgressBar>) -> ProgressCallback {
    Box::new(move |event: &ProgressEvent| match &spinner {
        Some(pb) => pb.set_message(progress_message(event)),
        None => info!("[*] {}", progress_message(event)),
    })
}

fn exit_with_error(formatter: &OutputFormatter, err: &StegError, verbose: bool) -> ! {
    eprint!("{}", formatter.format_user_friendly_error(&err.to_user_friendly(), err.context(), verbose));
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenames_take_precedence() {
        let paths = collect_input_paths(vec![PathBuf::from("a.png")], None).unwrap();
        assert_eq!(paths, Some(vec![PathBuf::from("a.png")]));
    }

    #[test]
    fn test_text_file_lines_trimmed_and_blank_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("inputs.txt");
        std::fs::write(&list, "cat.jpg  \n\n clip.mp4\r\n   \n").unwrap();

        let paths = collect_input_paths(Vec::new(), Some(&list)).unwrap().unwrap();
        assert_eq!(paths, vec![PathBuf::from("cat.jpg"), PathBuf::from(" clip.mp4")]);
    }

    #[test]
    fn test_missing_text_file_is_invalid_input() {
        let err = collect_input_paths(Vec::new(), Some(Path::new("/nonexistent/list.txt"))).unwrap_err();
        assert!(matches!(err, StegError::InvalidInput(_)));
    }

    #[test]
    fn test_no_input_flags() {
        assert_eq!(collect_input_paths(Vec::new(), None).unwrap(), None);
    }
}
