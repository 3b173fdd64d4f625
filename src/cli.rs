use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nba_refresh::config::{self, ConfigLayer, RefreshConfig, StaticFormat};
use nba_refresh::installer::{self, InstallPlan, Pin};
use nba_refresh::model::{StepKind, StepPolicy};
use nba_refresh::text_summary::build_text_summary;
use nba_refresh::{orchestrator, storage, tasks};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "nba-refresh",
    version,
    about = "Refresh NBA player data, regenerate the app's static data and verify it",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Flags for the default `update` command
    #[command(flatten)]
    pub update: UpdateArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the update pipeline once (default)
    Update(UpdateArgs),
    /// Install pinned numeric libraries, then the requirements file
    Install(InstallArgs),
    /// Run one project task target
    Task(TaskArgs),
    /// List task targets
    Tasks(CommonArgs),
    /// Show recent saved runs
    History(HistoryArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// JSON config file (default: <config dir>/nba-refresh/config.json if present)
    #[arg(long, env = "NBA_REFRESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base directory for relative paths (default: current directory)
    #[arg(long)]
    pub project_root: Option<PathBuf>,
}

impl CommonArgs {
    fn project_root(&self) -> Result<PathBuf> {
        match &self.project_root {
            Some(p) => Ok(p.clone()),
            None => std::env::current_dir().context("cannot determine current directory"),
        }
    }

    /// The config file layer: explicit path must load, the default path is
    /// used only when it exists.
    fn file_layer(&self) -> Result<ConfigLayer> {
        if let Some(path) = &self.config {
            return Ok(ConfigLayer::load(path)?);
        }
        match config::default_config_path() {
            Some(path) if path.is_file() => Ok(ConfigLayer::load(&path)?),
            _ => Ok(ConfigLayer::default()),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// URL to download the CSV snapshot from (download is skipped when unset)
    #[arg(long, env = "NBA_DATA_URL")]
    pub data_url: Option<String>,

    /// Source CSV path
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Generated static data path
    #[arg(long)]
    pub static_file: Option<PathBuf>,

    /// Generated static data format
    #[arg(long, value_enum)]
    pub static_format: Option<StaticFormat>,

    /// App entry file touched to trigger a reload
    #[arg(long)]
    pub app_entry: Option<PathBuf>,

    /// Append-only run log
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Base URL of the running app
    #[arg(long, env = "NBA_APP_BASE_URL")]
    pub base_url: Option<String>,

    /// Endpoint path to smoke-test (repeatable)
    #[arg(long = "endpoint")]
    pub endpoints: Vec<String>,

    /// External updater command used instead of the built-in regeneration.
    /// Split on whitespace; use --updater-arg for arguments containing spaces
    #[arg(long)]
    pub updater_command: Option<String>,

    /// Argument appended verbatim to the updater command (repeatable). Without
    /// --updater-command the first one names the program
    #[arg(long = "updater-arg", allow_hyphen_values = true)]
    pub updater_args: Vec<String>,

    /// Wait after triggering the reload before verifying
    #[arg(long)]
    pub reload_grace: Option<humantime::Duration>,

    /// Download timeout
    #[arg(long)]
    pub download_timeout: Option<humantime::Duration>,

    /// Per-request timeout for endpoint checks
    #[arg(long)]
    pub smoke_timeout: Option<humantime::Duration>,

    /// Minimum number of players the CSV must contain
    #[arg(long)]
    pub min_players: Option<usize>,

    /// Let this step fail without aborting the run (repeatable)
    #[arg(long, value_enum)]
    pub optional: Vec<StepKind>,

    /// Abort the run when this step fails (repeatable)
    #[arg(long, value_enum)]
    pub critical: Vec<StepKind>,

    /// Skip endpoint verification
    #[arg(long)]
    pub no_verify: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export the run report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

impl UpdateArgs {
    fn updater_argv(&self) -> Option<Vec<String>> {
        let mut argv: Vec<String> = self
            .updater_command
            .as_deref()
            .map(|c| c.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        argv.extend(self.updater_args.iter().cloned());
        (!argv.is_empty()).then_some(argv)
    }

    /// The CLI/env layer. Unset flags leave lower layers untouched.
    pub fn layer(&self) -> ConfigLayer {
        let mut policies = HashMap::new();
        for step in &self.optional {
            policies.insert(*step, StepPolicy::Optional);
        }
        for step in &self.critical {
            policies.insert(*step, StepPolicy::Critical);
        }
        ConfigLayer {
            csv: self.csv.clone(),
            static_file: self.static_file.clone(),
            static_format: self.static_format,
            app_entry: self.app_entry.clone(),
            log_file: self.log_file.clone(),
            lock_file: None,
            data_url: self.data_url.clone(),
            updater_command: self.updater_argv(),
            base_url: self.base_url.clone(),
            endpoints: (!self.endpoints.is_empty()).then(|| self.endpoints.clone()),
            download_timeout: self.download_timeout.map(Duration::from),
            smoke_timeout: self.smoke_timeout.map(Duration::from),
            reload_grace: self.reload_grace.map(Duration::from),
            verify: self.no_verify.then_some(false),
            policies,
            min_players: self.min_players,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct InstallArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Python interpreter used to run pip
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// Pinned package as NAME==VERSION (repeatable)
    #[arg(long = "pin", default_values = installer::DEFAULT_PINS)]
    pub pins: Vec<String>,

    /// Requirements file installed after the pins
    #[arg(long, default_value = "requirements.txt")]
    pub requirements: PathBuf,

    /// Do not check installed versions afterwards
    #[arg(long)]
    pub skip_verify: bool,

    /// Print the pip commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

impl InstallArgs {
    fn plan(&self) -> Result<InstallPlan> {
        Ok(InstallPlan {
            python: self.python.clone(),
            pins: self
                .pins
                .iter()
                .map(|p| Pin::parse(p))
                .collect::<Result<_>>()?,
            requirements: self.requirements.clone(),
            verify: !self.skip_verify,
            workdir: self.common.project_root()?,
        })
    }
}

#[derive(Debug, Args, Clone)]
pub struct TaskArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Target name, e.g. seed or docker-up
    pub target: String,

    /// Variable overrides as VAR=VALUE
    pub vars: Vec<String>,

    /// Print the rendered recipe instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct HistoryArgs {
    /// Number of runs to show, newest first
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Print the runs as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Whether non-error diagnostics should be suppressed.
    pub fn silent(&self) -> bool {
        match &self.command {
            Some(Command::Update(args)) => args.silent,
            Some(_) => false,
            None => self.update.silent,
        }
    }
}

/// Run the selected command and return the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
    match args.command {
        None => run_update(args.update).await,
        Some(Command::Update(u)) => run_update(u).await,
        Some(Command::Install(i)) => {
            installer::run_install(&i.plan()?, i.dry_run).await?;
            Ok(0)
        }
        Some(Command::Task(t)) => run_task(t).await,
        Some(Command::Tasks(_)) => {
            let vars = tasks::resolve_vars(&[], |k| std::env::var(k).ok())?;
            for line in tasks::help_lines(&vars) {
                println!("{line}");
            }
            Ok(0)
        }
        Some(Command::History(h)) => show_history(h),
    }
}

fn resolve_config(args: &UpdateArgs) -> Result<RefreshConfig> {
    let layer = args.common.file_layer()?.merge(args.layer());
    let cfg = RefreshConfig::resolve(&args.common.project_root()?, layer);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

async fn run_update(args: UpdateArgs) -> Result<i32> {
    let cfg = resolve_config(&args)?;
    let report = orchestrator::run_update(cfg, !args.silent).await?;
    let processed =
        orchestrator::process_run_completion(&report, args.auto_save, args.export_json.as_deref());

    if args.silent {
        if report.outcome.exit_code() != 0 {
            eprintln!(
                "update {}: see {}",
                report.outcome,
                report.log_path.display()
            );
        }
        return Ok(report.outcome.exit_code());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in build_text_summary(&report).lines {
            println!("{line}");
        }
    }
    if let Some(p) = processed.auto_saved_path {
        eprintln!("Saved: {}", p.display());
    }
    for msg in processed.export_messages {
        eprintln!("{msg}");
    }
    Ok(report.outcome.exit_code())
}

async fn run_task(args: TaskArgs) -> Result<i32> {
    let Some(target) = tasks::find(&args.target) else {
        bail!(
            "unknown target {:?}; run `nba-refresh tasks` for the list",
            args.target
        );
    };
    let vars = tasks::resolve_vars(&args.vars, |k| std::env::var(k).ok())?;
    match target.action {
        tasks::Action::Help => {
            for line in tasks::help_lines(&vars) {
                println!("{line}");
            }
            Ok(0)
        }
        tasks::Action::Install => {
            let plan = InstallPlan {
                python: "python3".into(),
                pins: installer::DEFAULT_PINS
                    .iter()
                    .map(|p| Pin::parse(p))
                    .collect::<Result<_>>()?,
                requirements: "requirements.txt".into(),
                verify: true,
                workdir: args.common.project_root()?,
            };
            installer::run_install(&plan, args.dry_run).await?;
            Ok(0)
        }
        tasks::Action::Shell(_) => {
            let lines = tasks::render_recipe(target, &vars)?;
            tasks::run_recipe(&lines, &args.common.project_root()?, args.dry_run).await
        }
    }
}

fn show_history(args: HistoryArgs) -> Result<i32> {
    let runs = storage::load_recent(args.limit)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(0);
    }
    if runs.is_empty() {
        println!("No saved runs");
        return Ok(0);
    }
    for r in &runs {
        let players = r
            .players
            .as_ref()
            .map(|p| format!("{} players", p.count))
            .unwrap_or_else(|| "no player data".into());
        println!("{}  {:<11}  {}  {}", r.started_at, r.outcome.to_string(), players, r.run_id);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nba-refresh").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_flags_run_the_update() {
        let cli = parse(&["--no-verify", "--optional", "verify", "--critical", "download"]);
        assert!(cli.command.is_none());
        let layer = cli.update.layer();
        assert_eq!(layer.verify, Some(false));
        assert_eq!(layer.policies.get(&StepKind::Verify), Some(&StepPolicy::Optional));
        assert_eq!(layer.policies.get(&StepKind::Download), Some(&StepPolicy::Critical));
        assert!(cli.update.auto_save);
        assert!(!cli.silent());
    }

    #[test]
    fn unset_flags_leave_lower_layers_alone() {
        let layer = parse(&[]).update.layer();
        assert_eq!(layer.verify, None);
        assert!(layer.policies.is_empty());
        assert_eq!(layer.endpoints, None);
        assert_eq!(layer.updater_command, None);
        assert_eq!(layer.reload_grace, None);
    }

    #[test]
    fn update_subcommand_maps_repeated_flags() {
        let cli = parse(&[
            "update",
            "--endpoint",
            "/api/a",
            "--endpoint",
            "/api/b",
            "--reload-grace",
            "2s",
            "--static-format",
            "json",
            "--silent",
            "--auto-save",
            "false",
        ]);
        assert!(cli.silent());
        let Some(Command::Update(u)) = cli.command else {
            panic!("expected update subcommand");
        };
        assert!(!u.auto_save);
        let layer = u.layer();
        assert_eq!(
            layer.endpoints,
            Some(vec!["/api/a".to_string(), "/api/b".to_string()])
        );
        assert_eq!(layer.reload_grace, Some(Duration::from_secs(2)));
        assert_eq!(layer.static_format, Some(StaticFormat::Json));
    }

    #[test]
    fn updater_args_keep_spaces() {
        let layer = parse(&[
            "--updater-command",
            "python3 -u",
            "--updater-arg",
            "/opt/my app/update.py",
            "--updater-arg",
            "--fast",
        ])
        .update
        .layer();
        assert_eq!(
            layer.updater_command,
            Some(vec![
                "python3".to_string(),
                "-u".to_string(),
                "/opt/my app/update.py".to_string(),
                "--fast".to_string(),
            ])
        );

        let layer = parse(&["--updater-arg", "/opt/my app/update.sh"]).update.layer();
        assert_eq!(layer.updater_command, Some(vec!["/opt/my app/update.sh".to_string()]));
    }

    #[test]
    fn task_takes_trailing_overrides() {
        let Some(Command::Task(t)) = parse(&["task", "seed", "YEAR=2020", "--dry-run"]).command
        else {
            panic!("expected task subcommand");
        };
        assert_eq!(t.target, "seed");
        assert_eq!(t.vars, vec!["YEAR=2020"]);
        assert!(t.dry_run);
    }

    #[test]
    fn install_defaults_to_pinned_libraries() {
        let Some(Command::Install(i)) = parse(&["install", "--skip-verify"]).command else {
            panic!("expected install subcommand");
        };
        let plan = i.plan().unwrap();
        let pins: Vec<String> = plan.pins.iter().map(Pin::to_string).collect();
        assert_eq!(pins, installer::DEFAULT_PINS);
        assert!(!plan.verify);
    }

    #[test]
    fn update_flags_conflict_with_subcommands() {
        assert!(Cli::try_parse_from(["nba-refresh", "--json", "install"]).is_err());
        assert!(Cli::try_parse_from(["nba-refresh", "--optional", "nope"]).is_err());
    }
}
