use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use log::{info, warn};
use ohprecip::cli::{
    Cli, Commands, OutputFormat, SeriesArgs, SpectrumArgs, render_template, resolve_config_path,
};
use ohprecip::info::{DatasetInfo, print_info_csv, print_info_human, print_info_json, print_info_yaml};
use ohprecip::input::{JobConfig, TimeSelection};
use ohprecip::log::{config_echo, show_farewell_with_timing, show_greeting, show_series_stats};
use ohprecip::output::write_dataframe;
use ohprecip::time::format_timestamp;
use ohprecip::transform::TransformPipeline;
use ohprecip::{OpenOptions, plot_series, plot_slice, run_job, with_dataset};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Info {
            file,
            detailed,
            variable,
            format,
            time_dimension,
        } => {
            let options = OpenOptions { time_dimension };
            let info = with_dataset(&file, &options, |dataset| {
                DatasetInfo::collect(dataset, variable.as_deref(), detailed)
            })
            .with_context(|| format!("Failed to inspect {}", file.display()))?;

            match format.unwrap_or(cli.output_format) {
                OutputFormat::Human => print_info_human(&info),
                OutputFormat::Json => print_info_json(&info)?,
                OutputFormat::Yaml => print_info_yaml(&info)?,
                OutputFormat::Csv => print_info_csv(&info),
            }
        }
        Commands::Series(args) => run_series(&args)?,
        Commands::Spectrum(args) => run_spectrum(&args)?,
        Commands::Run { config } => {
            let path = resolve_config_path(config, cli.config)
                .context("No job file given: pass CONFIG or --config")?;
            let start_time = Instant::now();
            show_greeting(&path.display().to_string());

            let config = JobConfig::from_file(&path)
                .with_context(|| format!("Failed to load job file {}", path.display()))?;
            config_echo(&config);
            let report = run_job(&config).context("Job failed")?;

            info!(
                "{} figures, {} exports",
                report.figures.len(),
                report.exports.len()
            );
            for skipped in &report.empty_selections {
                warn!("Empty selection skipped: {}", skipped);
            }
            show_farewell_with_timing(start_time.elapsed());
        }
        Commands::Validate { config, detailed } => {
            let path = resolve_config_path(config, cli.config)
                .context("No job file given: pass CONFIG or --config")?;
            let config = JobConfig::from_file(&path)
                .with_context(|| format!("Failed to load job file {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("Invalid job file {}", path.display()))?;

            println!(
                "✓ {} is valid: {} series, {} spectra",
                path.display(),
                config.series.len(),
                config.spectra.len()
            );
            if detailed {
                match cli.output_format {
                    OutputFormat::Yaml => print!("{}", config.to_yaml()?),
                    _ => println!("{}", config.to_json()?),
                }
            }
        }
        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let text = render_template(template_type, format)?;
            write_text(output, &text)?;
        }
        Commands::Completions { shell, output } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            let mut buffer = Vec::new();
            generate(shell, &mut command, name, &mut buffer);
            write_text(output, &String::from_utf8_lossy(&buffer))?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    }
    builder.format_timestamp(None).init();
}

fn write_text(output: Option<PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}

fn run_series(args: &SeriesArgs) -> Result<()> {
    if args.plot.is_none() && args.export.is_none() {
        warn!("Neither --plot nor --export given, only printing a summary");
    }
    let pipeline = TransformPipeline::from_configs(&args.transforms())?;
    let options = OpenOptions {
        time_dimension: args.time_dimension.clone(),
    };

    with_dataset(&args.file, &options, |dataset| {
        let series = pipeline.execute(&dataset.series(&args.variable)?);
        show_series_stats(&series);
        println!("{}", series);

        if let Some(path) = &args.plot {
            let figure = plot_series(&series, path, &args.plot_options())?;
            info!("Wrote {} ({} points)", figure.path.display(), figure.elements);
        }
        if let Some(path) = &args.export {
            write_dataframe(&series.to_dataframe()?, path)?;
            info!("Exported {}", path.display());
        }
        Ok(())
    })
    .with_context(|| format!("Failed to process series '{}' of {}", args.variable, args.file.display()))
}

fn run_spectrum(args: &SpectrumArgs) -> Result<()> {
    let selection = args.selection().map_err(anyhow::Error::msg)?;
    let options = OpenOptions {
        time_dimension: args.time_dimension.clone(),
    };

    with_dataset(&args.file, &options, |dataset| {
        let slice = match selection {
            TimeSelection::At(timestamp) => dataset.slice_at(&args.variable, timestamp)?,
            TimeSelection::Range(start, end) => {
                match dataset.slice_over_range(&args.variable, start, end)? {
                    Some(slice) => slice,
                    None => {
                        warn!(
                            "No records of '{}' between {} and {}",
                            args.variable,
                            format_timestamp(&start),
                            format_timestamp(&end)
                        );
                        return Ok(());
                    }
                }
            }
        };
        println!("{}, total {:.3}", slice, slice.total());

        if let Some(path) = &args.plot {
            let figure = plot_slice(&slice, path, &args.plot_options())?;
            info!("Wrote {} ({} cells)", figure.path.display(), figure.elements);
        }
        if let Some(path) = &args.export {
            write_dataframe(&slice.to_dataframe()?, path)?;
            info!("Exported {}", path.display());
        }
        Ok(())
    })
    .with_context(|| format!("Failed to process spectrum '{}' of {}", args.variable, args.file.display()))
}
