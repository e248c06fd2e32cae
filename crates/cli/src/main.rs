use clap::{Parser, Subcommand};
use anyhow::{Context, Result};

use lmmreport_core as core;
use core::data::{iqr_outlier_filter, DataFrame};
use core::diagnostics::{
    fixed_effects_table, format_wald_tests, joint_wald_tests, likelihood_ratio_test,
    lr_effect_sizes, pairwise_contrasts_at_reference, PAdjust, TableOptions, WaldGroup,
};
use core::lmm::{FittedModel, Optimizer};
use core::model::{observed_levels, MixedModel, MixedModelBuilder};
use core::report::{export_model_table, write_rows_csv};

#[derive(Parser)]
#[command(name = "lmmreport")]
#[command(version)]
#[command(about = "Random-intercept mixed models with contrasts, Wald/LR tests and table export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that fits a model.
#[derive(clap::Args)]
struct FitArgs {
    /// Path to data CSV file
    #[arg(short, long)]
    data: String,

    /// Grouping column of the random intercept
    #[arg(short, long)]
    groups: String,

    /// Fit by REML instead of ML
    #[arg(long)]
    reml: bool,

    /// Variance optimizer: "profile" (default) or "em"
    #[arg(long, default_value = "profile")]
    optimizer: String,

    /// Maximum number of optimizer iterations
    #[arg(long, default_value = "500")]
    max_iter: usize,

    /// Convergence tolerance
    #[arg(long, default_value = "1e-8")]
    tolerance: f64,

    /// Output format: "text" (default) or "json"
    #[arg(long, default_value = "text")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a linear mixed model with a random intercept
    Fit {
        #[command(flatten)]
        fit: FitArgs,

        /// Model formula (e.g. "AlphaPower ~ Gaze_c*C(Condition)")
        #[arg(short, long)]
        formula: String,

        /// Write the formatted model table to this .docx file
        #[arg(long)]
        docx: Option<String>,

        /// Write the tidy fixed-effect table to this CSV file
        #[arg(long)]
        csv: Option<String>,

        /// Task annotation for the tidy table
        #[arg(long)]
        task: Option<String>,

        /// Model label annotation for the tidy table
        #[arg(long)]
        label: Option<String>,
    },

    /// Pairwise contrasts between the levels of a categorical predictor
    Contrasts {
        #[command(flatten)]
        fit: FitArgs,

        /// Model formula containing the factor
        #[arg(short, long)]
        formula: String,

        /// Factor column to contrast
        #[arg(long)]
        factor: String,

        /// Comma-separated level order (default: order in the data)
        #[arg(long, value_delimiter = ',')]
        levels: Vec<String>,

        /// p-value adjustment: "bonferroni" (default), "fdr_bh" or "none"
        #[arg(long, default_value = "bonferroni")]
        adjust: String,

        /// Write the contrast table to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },

    /// Likelihood-ratio test of a reduced model nested in a full model
    Lrt {
        #[command(flatten)]
        fit: FitArgs,

        /// Full model formula
        #[arg(long)]
        full: String,

        /// Reduced model formula
        #[arg(long)]
        reduced: String,
    },

    /// Joint Wald tests of coefficient groups
    Wald {
        #[command(flatten)]
        fit: FitArgs,

        /// Model formula
        #[arg(short, long)]
        formula: String,

        /// Coefficient group as NAME=pattern[,pattern...] (repeatable)
        #[arg(long = "test", required = true)]
        tests: Vec<String>,

        /// Write the test table to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },

    /// Mask per-group IQR outliers and write the filtered table
    Outliers {
        /// Path to data CSV file
        #[arg(short, long)]
        data: String,

        /// Comma-separated numeric columns to filter
        #[arg(long, value_delimiter = ',', required = true)]
        vars: Vec<String>,

        /// Comma-separated grouping columns
        #[arg(long, value_delimiter = ',', required = true)]
        by: Vec<String>,

        /// Output CSV path
        #[arg(short, long)]
        output: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fit {
            fit,
            formula,
            docx,
            csv,
            task,
            label,
        } => cmd_fit(&fit, &formula, docx.as_deref(), csv.as_deref(), task, label),
        Commands::Contrasts {
            fit,
            formula,
            factor,
            levels,
            adjust,
            csv,
        } => cmd_contrasts(&fit, &formula, &factor, &levels, &adjust, csv.as_deref()),
        Commands::Lrt { fit, full, reduced } => cmd_lrt(&fit, &full, &reduced),
        Commands::Wald {
            fit,
            formula,
            tests,
            csv,
        } => cmd_wald(&fit, &formula, &tests, csv.as_deref()),
        Commands::Outliers {
            data,
            vars,
            by,
            output,
        } => cmd_outliers(&data, &vars, &by, &output),
    }
}

fn load_data(path: &str) -> Result<DataFrame> {
    let df = DataFrame::from_csv(path)
        .with_context(|| format!("Failed to load data from '{}'", path))?;
    eprintln!(
        "Loaded {} observations, {} columns from '{}'",
        df.nrows(),
        df.ncols(),
        path
    );
    Ok(df)
}

fn fit_model(df: &DataFrame, args: &FitArgs, formula: &str, reml: bool) -> Result<FittedModel> {
    fit_built(build_model(df, args, formula, reml)?, formula)
}

fn build_model(df: &DataFrame, args: &FitArgs, formula: &str, reml: bool) -> Result<MixedModel> {
    let optimizer: Optimizer = args
        .optimizer
        .parse()
        .with_context(|| format!("Invalid optimizer '{}'", args.optimizer))?;

    let model = MixedModelBuilder::new()
        .data(df)
        .formula(formula)
        .groups(&args.groups)
        .reml(reml)
        .optimizer(optimizer)
        .max_iterations(args.max_iter)
        .convergence(args.tolerance)
        .build()
        .with_context(|| format!("Failed to build model '{}'", formula))?;

    eprintln!(
        "Model: {} observations, {} fixed params, {} groups, {} by {}",
        model.n_obs,
        model.fixed_names.len(),
        model.group_names.len(),
        if reml { "REML" } else { "ML" },
        optimizer
    );
    Ok(model)
}

fn fit_built(model: MixedModel, formula: &str) -> Result<FittedModel> {
    let fitted = model
        .fit()
        .with_context(|| format!("Fitting '{}' failed", formula))?;
    if let Some(info) = fitted.fit_info() {
        log::info!("'{}' converged in {} iterations", formula, info.iterations);
    }
    Ok(fitted)
}

fn is_json(args: &FitArgs) -> Result<bool> {
    match args.format.to_lowercase().as_str() {
        "json" => Ok(true),
        "text" => Ok(false),
        other => anyhow::bail!("Unknown format '{}'. Use 'text' (default) or 'json'.", other),
    }
}

fn cmd_fit(
    args: &FitArgs,
    formula: &str,
    docx_path: Option<&str>,
    csv_path: Option<&str>,
    task: Option<String>,
    label: Option<String>,
) -> Result<()> {
    let df = load_data(&args.data)?;
    let model = fit_model(&df, args, formula, args.reml)?;

    let options = TableOptions {
        task,
        dv: model.response().map(str::to_string),
        model_label: label,
    };
    let rows = fixed_effects_table(&model, &options);

    if is_json(args)? {
        let json = serde_json::json!({
            "formula": model.formula(),
            "reml": model.is_reml(),
            "n_obs": model.n_obs(),
            "log_likelihood": model.log_likelihood(),
            "aic": model.aic(),
            "bic": model.bic(),
            "scale": model.scale(),
            "group_var": model.random_effects().map(|re| re.cov[(0, 0)]),
            "iterations": model.fit_info().map(|i| i.iterations),
            "fixed_effects": rows,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", model.summary());
    }

    if let Some(path) = docx_path {
        export_model_table(&model, path)
            .with_context(|| format!("Failed to write model table to '{}'", path))?;
        eprintln!("Wrote model table to '{}'", path);
    }
    if let Some(path) = csv_path {
        write_rows_csv(&rows, path)
            .with_context(|| format!("Failed to write fixed effects to '{}'", path))?;
        eprintln!("Wrote fixed effects to '{}'", path);
    }

    Ok(())
}

fn cmd_contrasts(
    args: &FitArgs,
    formula: &str,
    factor: &str,
    levels: &[String],
    adjust: &str,
    csv_path: Option<&str>,
) -> Result<()> {
    let p_adjust: PAdjust = adjust
        .parse()
        .with_context(|| format!("Invalid p-value adjustment '{}'", adjust))?;

    let df = load_data(&args.data)?;
    let model = build_model(&df, args, formula, args.reml)?;

    // default to the levels that reached the model, in coding order
    let levels = if levels.is_empty() {
        observed_levels(&df, factor, &model.rows)
            .with_context(|| format!("Failed to read levels of '{}'", factor))?
    } else {
        levels.to_vec()
    };
    let model = fit_built(model, formula)?;
    let levels: Vec<&str> = levels.iter().map(|s| s.as_str()).collect();

    let wrapped = format!("C({})", factor);
    let treatment = format!("{}[T.", wrapped);
    let prefix = if model.params().keys().any(|k| k.contains(&treatment)) {
        wrapped.as_str()
    } else {
        factor
    };

    let rows = pairwise_contrasts_at_reference(&model, &levels, prefix, p_adjust)
        .context("Failed to compute contrasts")?;

    if is_json(args)? {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("--- Pairwise contrasts of {} ({}) ---", factor, p_adjust);
        println!(
            "{:<14} {:<14} {:>10} {:>10} {:>8} {:>12} {:>12}",
            "group1", "group2", "estimate", "SE", "z", "p", "p_adj"
        );
        for r in &rows {
            println!(
                "{:<14} {:<14} {:>10.4} {:>10.4} {:>8.3} {:>12.4e} {:>12.4e}",
                r.group1, r.group2, r.estimate, r.se, r.z, r.p, r.p_adj
            );
        }
    }

    if let Some(path) = csv_path {
        write_rows_csv(&rows, path)
            .with_context(|| format!("Failed to write contrasts to '{}'", path))?;
    }
    Ok(())
}

fn cmd_lrt(args: &FitArgs, full: &str, reduced: &str) -> Result<()> {
    if args.reml {
        eprintln!("Warning: --reml ignored; nested models are compared by ML");
    }
    let df = load_data(&args.data)?;
    let full_model = fit_model(&df, args, full, false)?;
    let reduced_model = fit_model(&df, args, reduced, false)?;

    let lrt = likelihood_ratio_test(&full_model, &reduced_model)
        .context("Likelihood-ratio test failed")?;
    let n = full_model.n_obs().unwrap_or(0) as f64;
    let (r2, f2) = lr_effect_sizes(lrt.lr, lrt.df_used as f64, n);

    if full_model.n_obs() != reduced_model.n_obs() {
        eprintln!("Warning: models were fitted to different numbers of rows");
    }

    if is_json(args)? {
        let json = serde_json::json!({
            "test": lrt,
            "r2": r2,
            "f2": f2,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("--- Likelihood-ratio test ---");
        println!("Full:    {}  (logL = {:.4}, k = {})", full, lrt.ll_full, lrt.df_full);
        println!("Reduced: {}  (logL = {:.4}, k = {})", reduced, lrt.ll_reduced, lrt.df_reduced);
        println!("LR = {:.4}   df = {}   p = {:.4e}", lrt.lr, lrt.df_used, lrt.p);
        if lrt.df_fallback {
            println!("Note: parameter counts differ by {}; models may not be nested", lrt.df_diff);
        }
        println!("R² = {:.4}   f² = {:.4}", r2, f2);
    }
    Ok(())
}

/// Parse `NAME=pat1,pat2`.
fn parse_wald_group(arg: &str) -> Result<WaldGroup> {
    let (name, patterns) = arg
        .split_once('=')
        .with_context(|| format!("Wald group '{}' is not NAME=pattern[,pattern...]", arg))?;
    let patterns: Vec<&str> = patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        anyhow::bail!("Wald group '{}' has no patterns", name);
    }
    Ok(WaldGroup::new(name.trim(), &patterns))
}

fn cmd_wald(args: &FitArgs, formula: &str, tests: &[String], csv_path: Option<&str>) -> Result<()> {
    let groups = tests
        .iter()
        .map(|s| parse_wald_group(s))
        .collect::<Result<Vec<_>>>()?;

    let df = load_data(&args.data)?;
    let model = fit_model(&df, args, formula, args.reml)?;
    let rows = joint_wald_tests(&model, &groups).context("Wald tests failed")?;

    if is_json(args)? {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", format_wald_tests(&rows));
    }

    if let Some(path) = csv_path {
        write_rows_csv(&rows, path)
            .with_context(|| format!("Failed to write Wald tests to '{}'", path))?;
    }
    Ok(())
}

fn cmd_outliers(data_path: &str, vars: &[String], by: &[String], output: &str) -> Result<()> {
    let df = load_data(data_path)?;
    let vars: Vec<&str> = vars.iter().map(|s| s.as_str()).collect();
    let by: Vec<&str> = by.iter().map(|s| s.as_str()).collect();

    let filtered = iqr_outlier_filter(&df, &vars, &by).context("Outlier filtering failed")?;

    for var in &vars {
        let missing = |d: &DataFrame| -> Result<usize> {
            Ok(d.get_float(var)?.iter().filter(|v| v.is_nan()).count())
        };
        let masked = missing(&filtered)? - missing(&df)?;
        println!("{}: {} values masked", var, masked);
    }

    filtered
        .to_csv(output)
        .with_context(|| format!("Failed to write '{}'", output))?;
    eprintln!("Wrote filtered data to '{}'", output);
    Ok(())
}
