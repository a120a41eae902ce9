use crate::launcher::App;
use log::debug;
use std::{
    env,
    os::unix::process::CommandExt,
    process::{Command, Stdio},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LaunchError {
    #[error("App {0} has an empty Exec line")]
    EmptyExec(String),
    #[error(
        "Tried to start terminal app {0} but no terminal is configured. \
         Set `apps.term_cmd` in the config file or the TERMINAL environment variable"
    )]
    NoTerminal(String),
    #[error("Execution failed with Exec line `{exec}`: {reason}")]
    Spawn { exec: String, reason: String },
}

/// Splits `exec` into a program and its arguments, wrapping it in
/// `<term_cmd> -e` when `terminal` is given.
pub fn build_command(
    app: &App,
    terminal: Option<&str>,
) -> Result<(String, Vec<String>), LaunchError> {
    let mut parts = app.exec.split_whitespace().map(str::to_owned);
    let program = parts
        .next()
        .ok_or_else(|| LaunchError::EmptyExec(app.name.clone()))?;
    let args: Vec<String> = parts.collect();

    if !app.terminal {
        return Ok((program, args));
    }

    let term = terminal
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .ok_or_else(|| LaunchError::NoTerminal(app.name.clone()))?;
    let mut term_parts = term.split_whitespace().map(str::to_owned);
    let term_program = term_parts
        .next()
        .ok_or_else(|| LaunchError::NoTerminal(app.name.clone()))?;
    let mut term_args: Vec<String> = term_parts.collect();
    term_args.push(String::from("-e"));
    term_args.push(program);
    term_args.extend(args);
    Ok((term_program, term_args))
}

/// Runs `app` detached from the launcher's process group.
pub fn run(app: &App, term_cmd: Option<&str>) -> Result<(), LaunchError> {
    let terminal = term_cmd
        .map(str::to_owned)
        .or_else(|| env::var("TERMINAL").ok());
    let (program, args) = build_command(app, terminal.as_deref())?;
    debug!("Running `{} {}`", program, args.join(" "));

    Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map(drop)
        .map_err(|e| LaunchError::Spawn {
            exec: app.exec.clone(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(exec: &str, terminal: bool) -> App {
        App::new("Test".to_owned(), String::new(), exec.to_owned(), terminal)
    }

    #[test]
    fn splits_program_and_args() {
        let (program, args) = build_command(&app("firefox --private-window", false), None).unwrap();

        assert_eq!(program, "firefox");
        assert_eq!(args, vec!["--private-window".to_string()]);
    }

    #[test]
    fn empty_exec_is_an_error() {
        assert_eq!(
            build_command(&app("   ", false), None),
            Err(LaunchError::EmptyExec("Test".to_string()))
        );
    }

    #[test]
    fn terminal_apps_are_wrapped() {
        let (program, args) =
            build_command(&app("htop --tree", true), Some("kitty --single-instance")).unwrap();

        assert_eq!(program, "kitty");
        assert_eq!(
            args,
            vec![
                "--single-instance".to_string(),
                "-e".to_string(),
                "htop".to_string(),
                "--tree".to_string(),
            ]
        );
    }

    #[test]
    fn terminal_apps_need_a_terminal() {
        assert_eq!(
            build_command(&app("htop", true), Some("  ")),
            Err(LaunchError::NoTerminal("Test".to_string()))
        );
        assert_eq!(
            build_command(&app("htop", true), None),
            Err(LaunchError::NoTerminal("Test".to_string()))
        );
    }

    #[test]
    fn spawn_failure_is_reported() {
        let result = run(&app("/nonexistent/poki-test-binary", false), None);

        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
