//! # CLI Integration Tests
//!
//! Argument parsing for every subcommand, global flags and error cases.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use clap_complete::Shell;
    use std::path::PathBuf;

    use crate::cli::{
        Cli, Commands, ConfigFormat, EnvGuard, OutputFormat, RangeArg, TemplateType,
    };
    use crate::input::TimeSelection;
    use crate::time::parse_timestamp;

    /// Test basic CLI argument parsing
    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["ohprecip", "--help"]);
        assert!(result.is_err()); // --help causes early exit with "error"

        let error = result.unwrap_err();
        assert!(error.to_string().contains("OH-IIUNAM"));
    }

    /// Test version argument
    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["ohprecip", "--version"]);
        assert!(result.is_err()); // --version causes early exit
    }

    /// Test global flags
    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "ohprecip",
            "--verbose",
            "--output-format",
            "json",
            "--config",
            "/path/to/job.yaml",
            "template",
            "disdrometer",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/job.yaml")));
    }

    /// Test info command argument parsing
    #[test]
    fn test_info_command() {
        let cli = Cli::parse_from([
            "ohprecip", "info", "DISDRO_IIUNAM.nc", "--detailed", "-n", "spectrum", "--format",
            "yaml",
        ]);

        if let Commands::Info {
            file,
            detailed,
            variable,
            format,
            time_dimension,
        } = &cli.command
        {
            assert_eq!(file, &PathBuf::from("DISDRO_IIUNAM.nc"));
            assert!(detailed);
            assert_eq!(variable, &Some("spectrum".to_string()));
            assert_eq!(format, &Some(OutputFormat::Yaml));
            assert_eq!(time_dimension, "time");
        } else {
            panic!("Expected Info command");
        }
    }

    /// Test series command with every option
    #[test]
    fn test_series_command_full() {
        let _env = EnvGuard::clean();

        let cli = Cli::parse_from([
            "ohprecip",
            "series",
            "PLUVIO_PREPA2.nc",
            "-n",
            "intensity",
            "--mask-above",
            "400",
            "--divide-by",
            "60",
            "--plot",
            "p.png",
            "--export",
            "p.parquet",
            "--y-label",
            "Precipitation [mm]",
            "--time-limits",
            "2018-08-30 00:00,2018-08-31 00:00",
            "--value-limits",
            "-1:10",
        ]);

        let Commands::Series(args) = &cli.command else {
            panic!("Expected Series command");
        };
        assert_eq!(args.file, PathBuf::from("PLUVIO_PREPA2.nc"));
        assert_eq!(args.variable, "intensity");
        assert_eq!(args.mask_above, Some(400.0));
        assert_eq!(args.divide_by, Some(60.0));
        assert_eq!(args.plot, Some(PathBuf::from("p.png")));
        assert_eq!(args.export, Some(PathBuf::from("p.parquet")));
        assert_eq!(args.y_label.as_deref(), Some("Precipitation [mm]"));
        assert_eq!(args.value_limits, Some(RangeArg { min: -1.0, max: 10.0 }));

        let options = args.plot_options();
        assert_eq!(options.limits.value, Some((-1.0, 10.0)));
        assert_eq!(
            options.limits.time.map(|(start, _)| start),
            Some(parse_timestamp("2018-08-30").unwrap())
        );
    }

    /// Test series defaults
    #[test]
    fn test_series_command_defaults() {
        let _env = EnvGuard::clean();

        let cli = Cli::parse_from(["ohprecip", "series", "rain.nc"]);
        let Commands::Series(args) = &cli.command else {
            panic!("Expected Series command");
        };
        assert_eq!(args.variable, "intensity");
        assert_eq!(args.time_dimension, "time");
        assert_eq!(args.mask_above, None);
        assert_eq!(args.divide_by, None);
        assert!(args.transforms().is_empty());
        assert!(args.plot.is_none());
    }

    /// Test series value errors
    #[test]
    fn test_series_command_invalid_values() {
        let _env = EnvGuard::clean();

        assert!(Cli::try_parse_from(["ohprecip", "series", "r.nc", "--divide-by", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["ohprecip", "series", "r.nc", "--value-limits", "10:1"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["ohprecip", "series", "r.nc", "--time-limits", "yesterday"])
                .is_err()
        );
        // --units only makes sense together with --divide-by
        assert!(Cli::try_parse_from(["ohprecip", "series", "r.nc", "--units", "mm"]).is_err());
    }

    /// Test spectrum command at a timestamp
    #[test]
    fn test_spectrum_command_at() {
        let cli = Cli::parse_from([
            "ohprecip",
            "spectrum",
            "DISDRO_IIUNAM.nc",
            "--at",
            "2018-08-30 18:20",
            "--plot",
            "s.svg",
            "--x-range",
            "0:8",
        ]);

        let Commands::Spectrum(args) = &cli.command else {
            panic!("Expected Spectrum command");
        };
        assert_eq!(args.variable, "spectrum");
        assert_eq!(
            args.selection().unwrap(),
            TimeSelection::At(parse_timestamp("2018-08-30 18:20").unwrap())
        );
        let options = args.plot_options();
        assert_eq!(options.x_range, Some((0.0, 8.0)));
        assert_eq!(options.y_range, Some((0.0, 10.0)));
    }

    /// Test spectrum command over a range
    #[test]
    fn test_spectrum_command_range() {
        let cli = Cli::parse_from([
            "ohprecip",
            "spectrum",
            "DISDRO_IIUNAM.nc",
            "--from",
            "2018-08-30 00:00",
            "--to",
            "2018-08-30 23:59",
            "--export",
            "day.csv",
        ]);

        let Commands::Spectrum(args) = &cli.command else {
            panic!("Expected Spectrum command");
        };
        assert_eq!(
            args.selection().unwrap(),
            TimeSelection::Range(
                parse_timestamp("2018-08-30 00:00").unwrap(),
                parse_timestamp("2018-08-30 23:59").unwrap()
            )
        );
        assert_eq!(args.export, Some(PathBuf::from("day.csv")));
    }

    /// Test spectrum selection rules
    #[test]
    fn test_spectrum_command_selection_required() {
        // neither --at nor --from
        assert!(Cli::try_parse_from(["ohprecip", "spectrum", "d.nc"]).is_err());
        // --from without --to
        assert!(
            Cli::try_parse_from(["ohprecip", "spectrum", "d.nc", "--from", "2018-08-30"]).is_err()
        );
        // --at together with a range
        assert!(
            Cli::try_parse_from([
                "ohprecip", "spectrum", "d.nc", "--at", "2018-08-30", "--from", "2018-08-30",
                "--to", "2018-08-31",
            ])
            .is_err()
        );
        // malformed timestamp
        assert!(Cli::try_parse_from(["ohprecip", "spectrum", "d.nc", "--at", "noon"]).is_err());
    }

    /// Test run and validate commands
    #[test]
    fn test_run_and_validate_commands() {
        let cli = Cli::parse_from(["ohprecip", "run", "job.yaml"]);
        if let Commands::Run { config } = &cli.command {
            assert_eq!(config, &Some(PathBuf::from("job.yaml")));
        } else {
            panic!("Expected Run command");
        }

        let cli = Cli::parse_from(["ohprecip", "validate", "job.json", "--detailed"]);
        if let Commands::Validate { config, detailed } = &cli.command {
            assert_eq!(config, &Some(PathBuf::from("job.json")));
            assert!(detailed);
        } else {
            panic!("Expected Validate command");
        }
    }

    /// Test template command
    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from([
            "ohprecip",
            "template",
            "pluviometer",
            "--format",
            "yaml",
            "-o",
            "pluvio.yaml",
        ]);

        if let Commands::Template {
            template_type,
            output,
            format,
        } = &cli.command
        {
            assert_eq!(template_type, &TemplateType::Pluviometer);
            assert_eq!(output, &Some(PathBuf::from("pluvio.yaml")));
            assert_eq!(format, &ConfigFormat::Yaml);
        } else {
            panic!("Expected Template command");
        }

        assert!(Cli::try_parse_from(["ohprecip", "template", "radar"]).is_err());
    }

    /// Test completions command
    #[test]
    fn test_completions_command() {
        let cli = Cli::parse_from(["ohprecip", "completions", "zsh", "-o", "_ohprecip"]);
        if let Commands::Completions { shell, output } = &cli.command {
            assert_eq!(shell, &Shell::Zsh);
            assert_eq!(output, &Some(PathBuf::from("_ohprecip")));
        } else {
            panic!("Expected Completions command");
        }
    }

    /// Test output format values
    #[test]
    fn test_output_formats() {
        let formats = ["human", "json", "yaml", "csv"];

        for format in &formats {
            let cli = Cli::parse_from(["ohprecip", "--output-format", format, "template", "disdrometer"]);

            match *format {
                "human" => assert_eq!(cli.output_format, OutputFormat::Human),
                "json" => assert_eq!(cli.output_format, OutputFormat::Json),
                "yaml" => assert_eq!(cli.output_format, OutputFormat::Yaml),
                "csv" => assert_eq!(cli.output_format, OutputFormat::Csv),
                _ => unreachable!(),
            }
        }
    }

    /// Test conflicting verbose and quiet flags
    #[test]
    fn test_verbose_quiet_conflict() {
        let result = Cli::try_parse_from(["ohprecip", "--verbose", "--quiet", "info", "test.nc"]);
        assert!(result.is_err());

        let cli_quiet = Cli::parse_from(["ohprecip", "--quiet", "info", "test.nc"]);
        assert!(!cli_quiet.verbose);
        assert!(cli_quiet.quiet);
    }

    /// Test missing subcommand
    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["ohprecip"]).is_err());
    }
}
