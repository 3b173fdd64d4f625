//! Project task targets, a Makefile-style surface over the app's tooling.
//!
//! Recipes are shell lines with `$(VAR)` or `${VAR}` placeholders. Variable
//! values come from `VAR=VALUE` arguments, then the environment, then the
//! defaults below.

use crate::engine::command;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::path::Path;

pub const VARIABLES: [(&str, &str); 3] = [("SPORT", "nba"), ("YEAR", "2026"), ("SEASON", "2026")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Shell recipe lines, run in order, stopping at the first failure.
    Shell(&'static [&'static str]),
    /// The built-in dependency installer.
    Install,
    /// Print the target list.
    Help,
}

#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub name: &'static str,
    pub description: &'static str,
    pub action: Action,
}

pub const TARGETS: &[Target] = &[
    Target {
        name: "install",
        description: "Install pinned numeric libraries, then requirements",
        action: Action::Install,
    },
    Target {
        name: "run",
        description: "Run the app",
        action: Action::Shell(&["python app.py"]),
    },
    Target {
        name: "dev",
        description: "Run the app with the debug reloader",
        action: Action::Shell(&["FLASK_APP=app.py FLASK_DEBUG=1 flask run --port 5000"]),
    },
    Target {
        name: "prod",
        description: "Run the app under gunicorn",
        action: Action::Shell(&["gunicorn wsgi:app --bind 0.0.0.0:8000 --workers 4"]),
    },
    Target {
        name: "test",
        description: "Run the test suite",
        action: Action::Shell(&["python -m pytest -q"]),
    },
    Target {
        name: "clean",
        description: "Remove caches and build leftovers",
        action: Action::Shell(&[
            "find . -type d -name __pycache__ -prune -exec rm -rf {} +",
            "rm -rf .pytest_cache .mypy_cache build dist *.egg-info",
        ]),
    },
    Target {
        name: "seed",
        description: "Seed player data for $(YEAR)",
        action: Action::Shell(&["python scripts/seed_data.py --year $(YEAR)"]),
    },
    Target {
        name: "cache-clear",
        description: "Clear cached API responses",
        action: Action::Shell(&["rm -rf cache/*.json cache/*.pkl"]),
    },
    Target {
        name: "docker-build",
        description: "Build container images",
        action: Action::Shell(&["docker compose build"]),
    },
    Target {
        name: "docker-up",
        description: "Start containers in the background",
        action: Action::Shell(&["docker compose up -d"]),
    },
    Target {
        name: "docker-down",
        description: "Stop containers",
        action: Action::Shell(&["docker compose down"]),
    },
    Target {
        name: "update-rosters",
        description: "Refresh $(SPORT) rosters for season $(SEASON)",
        action: Action::Shell(&[
            "SEASON=$(SEASON) python scripts/update_$(SPORT)_players_from_api.py",
        ]),
    },
    Target {
        name: "lint",
        description: "Lint with flake8",
        action: Action::Shell(&["flake8 ."]),
    },
    Target {
        name: "format",
        description: "Format with black",
        action: Action::Shell(&["black ."]),
    },
    Target {
        name: "type-check",
        description: "Type-check with mypy",
        action: Action::Shell(&["mypy ."]),
    },
    Target {
        name: "db-init",
        description: "Initialize the database",
        action: Action::Shell(&["flask db init"]),
    },
    Target {
        name: "db-migrate",
        description: "Create and apply a migration",
        action: Action::Shell(&["flask db migrate", "flask db upgrade"]),
    },
    Target {
        name: "logs",
        description: "Follow container logs",
        action: Action::Shell(&["docker compose logs -f"]),
    },
    Target {
        name: "shell",
        description: "Open an app shell",
        action: Action::Shell(&["flask shell"]),
    },
    Target {
        name: "help",
        description: "List targets",
        action: Action::Help,
    },
];

pub fn find(name: &str) -> Option<&'static Target> {
    TARGETS.iter().find(|t| t.name == name)
}

/// Resolve variables: overrides > environment > defaults. Overrides for
/// unknown variables are rejected.
pub fn resolve_vars(
    overrides: &[String],
    env: impl Fn(&str) -> Option<String>,
) -> Result<BTreeMap<String, String>> {
    let mut vars: BTreeMap<String, String> = VARIABLES
        .iter()
        .map(|(k, default)| {
            let v = env(k).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string());
            (k.to_string(), v)
        })
        .collect();
    for o in overrides {
        let Some((k, v)) = o.split_once('=') else {
            bail!("expected VAR=VALUE, got {o:?}");
        };
        let k = k.trim();
        if !vars.contains_key(k) {
            let known: Vec<&str> = VARIABLES.iter().map(|(k, _)| *k).collect();
            bail!("unknown variable {k} (known: {})", known.join(", "));
        }
        vars.insert(k.to_string(), v.to_string());
    }
    Ok(vars)
}

/// Substitute `$(VAR)` and `${VAR}`. Unknown names are an error.
pub fn render(line: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let close = match after.chars().next() {
            Some('(') => Some(')'),
            Some('{') => Some('}'),
            _ => None,
        };
        let Some(close) = close else {
            out.push('$');
            rest = after;
            continue;
        };
        let Some(end) = after.find(close) else {
            bail!("unterminated variable reference in {line:?}");
        };
        let name = &after[1..end];
        match vars.get(name) {
            Some(v) => out.push_str(v),
            None => bail!("unknown variable {name} in {line:?}"),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Rendered recipe lines for a shell target.
pub fn render_recipe(target: &Target, vars: &BTreeMap<String, String>) -> Result<Vec<String>> {
    match target.action {
        Action::Shell(lines) => lines.iter().map(|l| render(l, vars)).collect(),
        Action::Install | Action::Help => Ok(Vec::new()),
    }
}

/// Run rendered recipe lines with `sh -c` in `cwd`, stopping at the first
/// failure. Returns that line's exit code, or 0.
pub async fn run_recipe(lines: &[String], cwd: &Path, dry_run: bool) -> Result<i32> {
    for line in lines {
        println!("{line}");
        if dry_run {
            continue;
        }
        let argv = vec!["sh".to_string(), "-c".to_string(), line.clone()];
        let status = command::status(&argv, cwd).await?;
        if !status.success() {
            let code = status.code().unwrap_or(1);
            tracing::error!(recipe = %line, code, "task command failed");
            return Ok(code);
        }
    }
    Ok(0)
}

/// Help text: one line per target plus variable defaults.
pub fn help_lines(vars: &BTreeMap<String, String>) -> Vec<String> {
    let mut lines = vec!["Targets:".to_string()];
    for t in TARGETS {
        let desc = render(t.description, vars).unwrap_or_else(|_| t.description.to_string());
        lines.push(format!("  {:<15} {}", t.name, desc));
    }
    lines.push(String::new());
    lines.push("Variables (override with VAR=VALUE):".to_string());
    for (k, default) in VARIABLES {
        lines.push(format!("  {k:<7} default {default}, now {}", vars[k]));
    }
    lines
}
