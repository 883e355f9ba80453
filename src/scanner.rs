//! # Project scanner.
//!
//! Walks a source tree and proposes [`ProcessDefinition`]s for the runnable
//! projects it recognizes:
//!
//! ```text
//! package.json with scripts.dev   ──► <shell> run `npm run dev` in its folder
//!                                      + HTTP probe when the dev script names a port
//! *.csproj (Web SDK or Exe output) ──► dotnet run --project "<path>" [--launch-profile "<p>"]
//!   (test projects skipped)            + HTTP probe on <applicationUrl>/health
//! ```
//!
//! `node_modules`, `bin`, `obj` and hidden directories are never entered;
//! `.gitignore` rules apply inside git checkouts. Results put backends first:
//! names mentioning `Web` or `Frontend` sort last, then `sort_order` is
//! assigned sequentially. Unreadable or malformed files are skipped.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{HealthCheckConfig, ProcessDefinition};
use crate::policies::RestartPolicy;

const SKIPPED_DIRS: &[&str] = &["node_modules", "bin", "obj"];

static PORT_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)--port\s+(\d+)").expect("valid regex"),
        Regex::new(r"(?i)-p\s+(\d+)").expect("valid regex"),
        Regex::new(r"(?i)PORT[=\s]+(\d+)").expect("valid regex"),
        Regex::new(r"(?i)port\s+(\d+)").expect("valid regex"),
    ]
});

static SDK_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<Project[^>]*\bSdk\s*=\s*"([^"]*)""#).expect("valid regex"));
static OUTPUT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<OutputType>\s*([^<\s]+)\s*</OutputType>").expect("valid regex"));

const TEST_MARKERS: &[&str] = &["Microsoft.NET.Test.Sdk", "xunit", "NUnit"];

/// Scans `root` and returns the proposed definitions, ordered.
///
/// A missing or unreadable root yields an empty list.
pub fn scan_directory(root: impl AsRef<Path>) -> Vec<ProcessDefinition> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Vec::new();
    }

    let mut csprojs = Vec::new();
    let mut packages = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .filter_entry(|e| {
            let is_dir = e.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && e.depth() > 0 && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .build();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.into_path();
        match path.file_name().and_then(|n| n.to_str()) {
            Some("package.json") => packages.push(path),
            Some(name) if name.to_ascii_lowercase().ends_with(".csproj") => csprojs.push(path),
            _ => {}
        }
    }
    csprojs.sort();
    packages.sort();

    let mut found: Vec<ProcessDefinition> = csprojs
        .iter()
        .filter_map(|p| analyze_csproj(p))
        .chain(packages.iter().filter_map(|p| analyze_package_json(p)))
        .collect();

    found.sort_by_key(|d| d.name.contains("Frontend") || d.name.contains("Web"));
    for (i, def) in found.iter_mut().enumerate() {
        def.sort_order = i32::try_from(i).unwrap_or(i32::MAX);
    }
    tracing::info!(root = %root.display(), found = found.len(), "project scan finished");
    found
}

// ---------------------------------------------------------------------------
// package.json
// ---------------------------------------------------------------------------

fn analyze_package_json(path: &Path) -> Option<ProcessDefinition> {
    let raw = std::fs::read_to_string(path).ok()?;
    let pkg: Value = match serde_json::from_str(&raw) {
        Ok(pkg) => pkg,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "malformed package.json");
            return None;
        }
    };
    let dev = pkg.get("scripts")?.get("dev")?;
    let script = dev.as_str().unwrap_or_default();

    let dir = path.parent()?;
    let folder = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let (command, arguments) = dev_script_launcher();

    let mut def = ProcessDefinition::new(format!("{folder} ({})", frontend_kind(&pkg)), command, arguments)
        .with_working_directory(dir.to_string_lossy())
        .with_restart(RestartPolicy {
            max_attempts: 2,
            delay_secs: 3,
            ..RestartPolicy::default()
        });
    if let Some(port) = extract_port(script) {
        def = def.with_health_check(
            HealthCheckConfig::http(format!("http://localhost:{port}"))
                .with_interval(60)
                .with_timeout(10)
                .with_threshold(2),
        );
    }
    Some(def)
}

/// Shell wrapper that runs the `dev` script on this platform.
fn dev_script_launcher() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/c npm run dev")
    } else {
        ("sh", "-c 'npm run dev'")
    }
}

fn frontend_kind(pkg: &Value) -> &'static str {
    let has = |section: &str, name: &str| pkg.get(section).and_then(|s| s.get(name)).is_some();
    if pkg.get("dependencies").is_none() {
        return "Frontend";
    }
    if has("dependencies", "next") {
        "Next.js"
    } else if has("dependencies", "nuxt") {
        "Nuxt"
    } else if has("dependencies", "react-native") {
        "React Native"
    } else if has("dependencies", "expo") {
        "Expo"
    } else if has("dependencies", "react") {
        if has("devDependencies", "vite") { "React/Vite" } else { "React" }
    } else if has("dependencies", "vue") {
        "Vue"
    } else if has("dependencies", "@angular/core") {
        "Angular"
    } else {
        "Frontend"
    }
}

/// First port named in a dev script (`--port 3000`, `-p 4000`, `PORT=5173`).
fn extract_port(script: &str) -> Option<u16> {
    PORT_PATTERNS.iter().find_map(|re| {
        re.captures(script)
            .and_then(|c| c[1].parse::<u16>().ok())
            .filter(|p| *p > 0)
    })
}

// ---------------------------------------------------------------------------
// .csproj
// ---------------------------------------------------------------------------

fn analyze_csproj(path: &Path) -> Option<ProcessDefinition> {
    let content = std::fs::read_to_string(path).ok()?;
    let sdk = SDK_ATTR.captures(&content).map(|c| c[1].to_string()).unwrap_or_default();
    let output = OUTPUT_TYPE.captures(&content).map(|c| c[1].to_string()).unwrap_or_default();

    let is_web = sdk.to_ascii_lowercase().contains("microsoft.net.sdk.web");
    let is_exe = output.eq_ignore_ascii_case("exe") || output.eq_ignore_ascii_case("winexe");
    if !is_web && !is_exe {
        return None;
    }

    let project = path.file_stem()?.to_string_lossy().into_owned();
    if is_test_project(&project, &content) {
        return None;
    }

    let dir = path.parent()?;
    let (profile, url) = launch_profile(dir).unzip();

    let mut arguments = format!("run --project \"{}\"", path.display());
    if let Some(profile) = &profile {
        arguments.push_str(&format!(" --launch-profile \"{profile}\""));
    }
    let working_dir = solution_dir(path).unwrap_or_else(|| dir.to_path_buf());

    let mut def = ProcessDefinition::new(display_name(&project, is_web), "dotnet", arguments)
        .with_working_directory(working_dir.to_string_lossy())
        .with_restart(RestartPolicy {
            max_attempts: 3,
            delay_secs: 5,
            ..RestartPolicy::default()
        });
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        def = def.with_health_check(
            HealthCheckConfig::http(format!("{}/health", url.trim_end_matches('/')))
                .with_interval(30)
                .with_timeout(5)
                .with_threshold(3),
        );
    }
    Some(def)
}

fn is_test_project(name: &str, content: &str) -> bool {
    let lower = name.to_lowercase();
    ["test", "spec", "benchmark"].iter().any(|m| lower.contains(m)) || TEST_MARKERS.iter().any(|m| content.contains(m))
}

/// `(profile name, first application URL)` from `Properties/launchSettings.json`.
///
/// Prefers the first `commandName: "Project"` profile, then the first profile
/// whose name mentions http and not IIS.
fn launch_profile(project_dir: &Path) -> Option<(String, String)> {
    let raw = std::fs::read_to_string(project_dir.join("Properties").join("launchSettings.json")).ok()?;
    let settings: Value = serde_json::from_str(&raw).ok()?;
    let profiles = settings.get("profiles")?.as_object()?;

    let first_url = |p: &Value| {
        p.get("applicationUrl")
            .and_then(Value::as_str)
            .and_then(|u| u.split(';').next())
            .unwrap_or_default()
            .to_string()
    };

    profiles
        .iter()
        .find(|(_, p)| p.get("commandName").and_then(Value::as_str) == Some("Project"))
        .or_else(|| {
            profiles.iter().find(|(name, _)| {
                let name = name.to_lowercase();
                name.contains("http") && !name.contains("iis")
            })
        })
        .map(|(name, p)| (name.clone(), first_url(p)))
}

fn display_name(project: &str, is_web: bool) -> String {
    let lower = project.to_lowercase();
    if lower.ends_with("api") {
        "API Backend".to_string()
    } else if lower.contains("worker") || lower.contains("job") {
        "Background Worker".to_string()
    } else if lower.contains("gateway") {
        "API Gateway".to_string()
    } else if is_web {
        format!("{project} (Web)")
    } else {
        project.to_string()
    }
}

/// Nearest ancestor directory of `csproj` holding a `.sln` file.
fn solution_dir(csproj: &Path) -> Option<PathBuf> {
    csproj.ancestors().skip(1).find_map(|dir| {
        let entries = std::fs::read_dir(dir).ok()?;
        let has_sln = entries
            .filter_map(Result::ok)
            .any(|e| e.path().extension().is_some_and(|x| x.eq_ignore_ascii_case("sln")));
        has_sln.then(|| dir.to_path_buf())
    })
}
