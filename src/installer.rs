//! Dependency installer.
//!
//! Force-reinstalls pinned numeric libraries before the general requirement
//! set so the pinned builds win over whatever was preinstalled.

use crate::engine::command;
use crate::error::StepError;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_PINS: [&str; 2] = ["numpy==1.24.3", "pandas==1.5.3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub name: String,
    pub version: String,
}

impl Pin {
    /// Parse `name==version`.
    pub fn parse(s: &str) -> Result<Pin> {
        let Some((name, version)) = s.trim().split_once("==") else {
            bail!("invalid pin {s:?}: expected NAME==VERSION");
        };
        let (name, version) = (name.trim(), version.trim());
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid_name || version.is_empty() || version.contains('=') {
            bail!("invalid pin {s:?}: expected NAME==VERSION");
        }
        Ok(Pin {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub python: String,
    pub pins: Vec<Pin>,
    pub requirements: PathBuf,
    pub verify: bool,
    pub workdir: PathBuf,
}

impl InstallPlan {
    fn pip(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.python.clone(), "-m".into(), "pip".into()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    pub fn uninstall_cmd(&self) -> Vec<String> {
        let mut argv = self.pip(&["uninstall", "-y"]);
        argv.extend(self.pins.iter().map(|p| p.name.clone()));
        argv
    }

    pub fn install_pins_cmd(&self) -> Vec<String> {
        let mut argv = self.pip(&["install"]);
        argv.extend(self.pins.iter().map(Pin::to_string));
        argv
    }

    pub fn install_requirements_cmd(&self) -> Vec<String> {
        let req = self.requirements.display().to_string();
        self.pip(&["install", "-r", &req])
    }

    pub fn show_cmd(&self, pin: &Pin) -> Vec<String> {
        self.pip(&["show", &pin.name])
    }

    fn requirements_path(&self) -> PathBuf {
        if self.requirements.is_absolute() {
            self.requirements.clone()
        } else {
            self.workdir.join(&self.requirements)
        }
    }
}

/// Extract the `Version:` field from `pip show` output.
pub fn parse_pip_show_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("version")
            .then(|| value.trim().to_string())
    })
}

async fn run_fatal(argv: &[String], cwd: &Path) -> Result<()> {
    println!("+ {}", command::describe(argv));
    let status = command::status(argv, cwd).await?;
    if !status.success() {
        return Err(StepError::Command {
            command: command::describe(argv),
            status: status.to_string(),
            detail: "see output above".into(),
        }
        .into());
    }
    Ok(())
}

/// Run the install sequence. The uninstall step is best-effort; every later
/// step stops the install on failure.
pub async fn run_install(plan: &InstallPlan, dry_run: bool) -> Result<()> {
    if plan.pins.is_empty() {
        bail!("no pinned packages given");
    }
    let uninstall = plan.uninstall_cmd();
    let pins = plan.install_pins_cmd();
    let reqs = plan.install_requirements_cmd();
    let has_requirements = plan.requirements_path().is_file();

    if dry_run {
        for argv in [&uninstall, &pins, &reqs] {
            println!("{}", command::describe(argv));
        }
        return Ok(());
    }

    println!("+ {}", command::describe(&uninstall));
    match command::status(&uninstall, &plan.workdir).await {
        Ok(s) if s.success() => {}
        Ok(s) => tracing::warn!(status = %s, "uninstall failed; continuing"),
        Err(e) => tracing::warn!(error = %e, "uninstall failed; continuing"),
    }

    run_fatal(&pins, &plan.workdir).await?;

    if has_requirements {
        run_fatal(&reqs, &plan.workdir).await?;
    } else {
        tracing::warn!(
            path = %plan.requirements_path().display(),
            "requirements file not found; skipping"
        );
    }

    if plan.verify {
        verify_pins(plan).await?;
    }
    println!("Dependencies installed");
    Ok(())
}

/// Confirm each pinned package reports exactly the pinned version.
pub async fn verify_pins(plan: &InstallPlan) -> Result<()> {
    for pin in &plan.pins {
        let out = command::checked_output(&plan.show_cmd(pin), &plan.workdir)
            .await
            .with_context(|| format!("checking installed version of {}", pin.name))?;
        let installed = parse_pip_show_version(&out.stdout)
            .with_context(|| format!("pip show {} printed no version", pin.name))?;
        if installed != pin.version {
            bail!(
                "{} is at {} after install, expected {}",
                pin.name,
                installed,
                pin.version
            );
        }
        println!("{} {} OK", pin.name, installed);
    }
    Ok(())
}
