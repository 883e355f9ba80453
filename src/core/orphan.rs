//! # Orphan matching.
//!
//! Decides which running OS process, if any, belongs to a definition that the
//! supervisor did not launch in this session. Matching is a best-effort
//! heuristic over free-text command lines, driven by an ordered rule table
//! keyed on the shape of the definition's command:
//!
//! ```text
//! shape          applies when                         primary match                          secondary match
//! ─────────────  ───────────────────────────────────  ─────────────────────────────────────  ───────────────────────
//! ProjectHost    command is a project host (dotnet)   host + project path, else bare args    -
//! ScriptShell    command is a shell (cmd, sh, ...)    runner keyword + working directory     runtime + working dir
//! Generic        always                               command + argument string              -
//! ```
//!
//! Comparisons are case-insensitive with path separators normalized to `/`.
//! The first rule that applies is the only one used. The first candidate
//! accepted by the primary pass wins; the secondary pass only runs when the
//! primary pass found nothing. Candidates are never marked as consumed, so
//! two definitions can claim the same process.

use crate::core::os::RunningProcess;
use crate::model::ProcessDefinition;

const PROJECT_HOSTS: &[&str] = &["dotnet"];
const SHELLS: &[&str] = &["cmd", "sh", "bash", "zsh", "pwsh", "powershell"];
const SCRIPT_RUNNERS: &[&str] = &["npm", "pnpm", "yarn", "bun"];
/// Interpreter that script runners end up spawning.
const SCRIPT_RUNTIME: &str = "node";

/// Command shape a definition is matched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandShape {
    /// Launcher running a project file (`dotnet run --project <path>`).
    ProjectHost,
    /// Shell wrapper invoking a package-script runner (`cmd /c npm run dev`).
    ScriptShell,
    /// Anything else.
    Generic,
}

/// Lowercased, separator-normalized view of a definition.
#[derive(Debug)]
struct Key {
    command: String,
    program: String,
    args: String,
    project: Option<String>,
    working_dir: String,
    runner: Option<&'static str>,
}

impl Key {
    fn new(def: &ProcessDefinition) -> Self {
        let command = normalize(def.command.trim());
        let program = program_name(&command);
        let args = normalize(def.arguments.trim());
        let working_dir = normalize(def.working_directory.trim())
            .trim_end_matches('/')
            .to_string();
        let project = project_path(&args);
        let runner = SCRIPT_RUNNERS
            .iter()
            .copied()
            .find(|r| {
                args.split_whitespace()
                    .any(|tok| tok.trim_matches(['\'', '"']) == *r)
            });
        Self {
            command,
            program,
            args,
            project,
            working_dir,
            runner,
        }
    }
}

type Matcher = fn(&Key, &str) -> bool;

struct Rule {
    shape: CommandShape,
    applies: fn(&Key) -> bool,
    primary: Matcher,
    secondary: Option<Matcher>,
}

static RULES: [Rule; 3] = [
    Rule {
        shape: CommandShape::ProjectHost,
        applies: |k| PROJECT_HOSTS.contains(&k.program.as_str()),
        primary: match_project_host,
        secondary: None,
    },
    Rule {
        shape: CommandShape::ScriptShell,
        applies: |k| SHELLS.contains(&k.program.as_str()),
        primary: match_script_shell,
        secondary: Some(match_script_runtime),
    },
    Rule {
        shape: CommandShape::Generic,
        applies: |_| true,
        primary: match_generic,
        secondary: None,
    },
];

fn match_project_host(key: &Key, candidate: &str) -> bool {
    if key.args.is_empty() || !candidate.contains(key.program.as_str()) {
        return false;
    }
    if let Some(project) = &key.project {
        if candidate.contains(project.as_str()) {
            return true;
        }
    }
    candidate.contains(key.args.replace('"', "").as_str())
}

fn match_script_shell(key: &Key, candidate: &str) -> bool {
    let runner = key.runner.unwrap_or("npm");
    !key.working_dir.is_empty()
        && candidate.contains(runner)
        && candidate.contains("run")
        && candidate.contains(key.working_dir.as_str())
}

fn match_script_runtime(key: &Key, candidate: &str) -> bool {
    key.runner.is_some()
        && !key.working_dir.is_empty()
        && candidate.contains(SCRIPT_RUNTIME)
        && candidate.contains(key.working_dir.as_str())
}

fn match_generic(key: &Key, candidate: &str) -> bool {
    !key.args.is_empty() && candidate.contains(key.command.as_str()) && candidate.contains(key.args.as_str())
}

/// Shape `def` is matched by.
pub fn shape_of(def: &ProcessDefinition) -> CommandShape {
    let key = Key::new(def);
    rule_for(&key).shape
}

fn rule_for(key: &Key) -> &'static Rule {
    // Generic always applies, so the table is never exhausted.
    RULES
        .iter()
        .find(|r| (r.applies)(key))
        .unwrap_or(&RULES[RULES.len() - 1])
}

/// Finds the running process that belongs to `def`, if any.
///
/// `own_pid` (the supervisor itself) is never returned.
pub fn find_orphan<'a>(
    def: &ProcessDefinition,
    candidates: &'a [RunningProcess],
    own_pid: u32,
) -> Option<&'a RunningProcess> {
    let key = Key::new(def);
    if key.command.is_empty() {
        return None;
    }
    let rule = rule_for(&key);

    let lowered: Vec<(&RunningProcess, String)> = candidates
        .iter()
        .filter(|p| p.pid != own_pid && !p.command_line.trim().is_empty())
        .map(|p| (p, normalize(&p.command_line)))
        .collect();

    let pass = |m: Matcher| lowered.iter().find(|(_, line)| m(&key, line)).map(|(p, _)| *p);
    pass(rule.primary).or_else(|| rule.secondary.and_then(pass))
}

fn normalize(s: &str) -> String {
    s.to_lowercase().replace('\\', "/")
}

/// Last path component without a `.exe` suffix.
fn program_name(command: &str) -> String {
    let base = command.rsplit('/').next().unwrap_or(command);
    base.strip_suffix(".exe").unwrap_or(base).to_string()
}

/// Path following `--project`, quoted or up to the next space.
fn project_path(args: &str) -> Option<String> {
    let idx = args.find("--project")?;
    let rest = args[idx + "--project".len()..].trim_start();
    let path = if let Some(quoted) = rest.strip_prefix('"') {
        quoted.split('"').next().unwrap_or(quoted)
    } else {
        rest.split(' ').next().unwrap_or(rest)
    };
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, line: &str) -> RunningProcess {
        RunningProcess::new(pid, line)
    }

    #[test]
    fn shapes() {
        assert_eq!(
            shape_of(&ProcessDefinition::new("api", "dotnet", "run --project a.csproj")),
            CommandShape::ProjectHost
        );
        assert_eq!(
            shape_of(&ProcessDefinition::new("web", "C:\\Windows\\cmd.exe", "/c npm run dev")),
            CommandShape::ScriptShell
        );
        assert_eq!(shape_of(&ProcessDefinition::new("w", "python", "worker.py")), CommandShape::Generic);
    }

    #[test]
    fn project_path_extraction() {
        assert_eq!(
            project_path(r#"run --project "d:/src/api/api.csproj" --no-build"#).as_deref(),
            Some("d:/src/api/api.csproj")
        );
        assert_eq!(project_path("run --project api.csproj -c debug").as_deref(), Some("api.csproj"));
        assert_eq!(project_path("run"), None);
    }

    #[test]
    fn project_host_matches_by_project_path() {
        let def = ProcessDefinition::new(
            "api",
            "dotnet",
            r#"run --project "D:\source\Shop\src\Shop.Api\Shop.Api.csproj""#,
        );
        let procs = vec![
            proc(10, "dotnet run --project D:/source/Other/Other.csproj"),
            proc(11, r#""C:\Program Files\dotnet\dotnet.exe" run --project "d:\source\shop\src\shop.api\shop.api.csproj""#),
        ];
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(11));
    }

    #[test]
    fn project_host_falls_back_to_unquoted_args() {
        let def = ProcessDefinition::new("api", "dotnet", r#"watch "run""#);
        let procs = vec![proc(20, "dotnet watch run")];
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(20));
    }

    #[test]
    fn script_shell_needs_runner_and_working_dir() {
        let def = ProcessDefinition::new("web", "cmd", "/c npm run dev").with_working_directory("D:/source/Shop/web/");
        let procs = vec![
            proc(30, "npm run dev --prefix d:/source/other"),
            proc(31, r"C:\Program Files\nodejs\node.exe npm-cli.js run dev D:\Source\Shop\web"),
        ];
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(31));
    }

    #[test]
    fn script_shell_secondary_pass_matches_runtime() {
        let def = ProcessDefinition::new("web", "sh", "-c 'npm run dev'").with_working_directory("/home/me/shop/web");
        let procs = vec![
            proc(40, "/usr/bin/python3 /home/me/shop/web/tool.py"),
            proc(41, "node /home/me/shop/web/node_modules/.bin/vite"),
        ];
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(41));
    }

    #[test]
    fn script_shell_without_working_dir_never_matches() {
        let def = ProcessDefinition::new("web", "cmd", "/c npm run dev");
        let procs = vec![proc(50, "npm run dev")];
        assert!(find_orphan(&def, &procs, 1).is_none());
    }

    #[test]
    fn generic_requires_command_and_args() {
        let def = ProcessDefinition::new("worker", "python", "worker.py --queue jobs");
        let procs = vec![
            proc(60, "python other.py"),
            proc(61, "/usr/bin/python worker.py --queue jobs"),
        ];
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(61));

        let bare = ProcessDefinition::new("worker", "python", "");
        assert!(find_orphan(&bare, &procs, 1).is_none());
    }

    #[test]
    fn own_pid_is_excluded() {
        let def = ProcessDefinition::new("worker", "python", "worker.py");
        let procs = vec![proc(70, "python worker.py")];
        assert!(find_orphan(&def, &procs, 70).is_none());
        assert_eq!(find_orphan(&def, &procs, 1).map(|p| p.pid), Some(70));
    }

    #[test]
    fn same_process_can_match_two_definitions() {
        let a = ProcessDefinition::new("a", "python", "worker.py");
        let b = ProcessDefinition::new("b", "python", "worker.py --verbose");
        let procs = vec![proc(80, "python worker.py --verbose")];
        assert_eq!(find_orphan(&a, &procs, 1).map(|p| p.pid), Some(80));
        assert_eq!(find_orphan(&b, &procs, 1).map(|p| p.pid), Some(80));
    }
}
