//! Line grammar and the interactive read-eval-print loop.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use scenelink::{DEFAULT_RENDER_PATH, Sender, TIMESTAMP_FORMAT, Value};

const PROMPT: &str = "scenelink> ";

pub(crate) const HELP: &str = "\
commands:
  create_cube [x y z [size]]          add a cube (default origin, size 2)
  create_sphere [x y z [radius]]      add a UV sphere (default origin, radius 1)
  delete_all                          remove every object
  render_scene [path]                 render to path (default //render.png)
  execute_code <code...>              run the rest of the line as a script
  create_text_block [-x] <name> <code...>
                                      store a script; -x also runs it
  execute_text_block <name>           run a stored script
  help                                show this list
  exit | quit                         leave the shell
";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Line {
    Empty,
    Help,
    Exit,
    Call(Call),
}

/// A command to send to the listener.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateCube { location: [f64; 3], size: f64 },
    CreateSphere { location: [f64; 3], radius: f64 },
    DeleteAll,
    RenderScene { filepath: String },
    ExecuteCode { code: String },
    CreateTextBlock { name: String, code: String, execute: bool },
    ExecuteTextBlock { name: String },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("unknown command `{0}` (type `help` for a list)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("`{0}` is not a number")]
    NotANumber(String),
}

impl Call {
    /// Sends the command and returns the listener's result.
    pub(crate) fn invoke(self, sender: &Sender) -> scenelink::Result<Option<Value>> {
        match self {
            Self::CreateCube { location, size } => sender.create_cube(location, size),
            Self::CreateSphere { location, radius } => sender.create_sphere(location, radius),
            Self::DeleteAll => sender.delete_all(),
            Self::RenderScene { filepath } => sender.render_scene(&filepath),
            Self::ExecuteCode { code } => sender.execute_code(&code),
            Self::CreateTextBlock {
                name,
                code,
                execute,
            } => sender.create_text_block(&code, Some(&name), execute),
            Self::ExecuteTextBlock { name } => sender.execute_text_block(&name),
        }
    }
}

/// Parses one shell line.
pub(crate) fn parse_line(line: &str) -> Result<Line, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Line::Empty);
    }
    let (word, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(w, r)| (w, r.trim()));
    let args: Vec<&str> = rest.split_whitespace().collect();

    let call = match word.to_ascii_lowercase().as_str() {
        "help" => return Ok(Line::Help),
        "exit" | "quit" => return Ok(Line::Exit),
        "create_cube" => {
            let (location, size) = primitive(&args, 2.0, "create_cube [x y z [size]]")?;
            Call::CreateCube { location, size }
        }
        "create_sphere" => {
            let (location, radius) = primitive(&args, 1.0, "create_sphere [x y z [radius]]")?;
            Call::CreateSphere { location, radius }
        }
        "delete_all" if args.is_empty() => Call::DeleteAll,
        "delete_all" => return Err(ParseError::Usage("delete_all")),
        "render_scene" => Call::RenderScene {
            filepath: if rest.is_empty() {
                DEFAULT_RENDER_PATH
            } else {
                rest
            }
            .to_owned(),
        },
        "execute_code" if rest.is_empty() => {
            return Err(ParseError::Usage("execute_code <code...>"));
        }
        "execute_code" => Call::ExecuteCode {
            code: rest.to_owned(),
        },
        "create_text_block" => text_block(rest)?,
        "execute_text_block" => match args.as_slice() {
            [name] => Call::ExecuteTextBlock {
                name: (*name).to_owned(),
            },
            _ => return Err(ParseError::Usage("execute_text_block <name>")),
        },
        _ => return Err(ParseError::Unknown(word.to_owned())),
    };
    Ok(Line::Call(call))
}

/// `[x y z [extent]]` with defaults for whatever is left out.
fn primitive(
    args: &[&str],
    default_extent: f64,
    usage: &'static str,
) -> Result<([f64; 3], f64), ParseError> {
    match *args {
        [] => Ok(([0.0; 3], default_extent)),
        [x, y, z] => Ok(([number(x)?, number(y)?, number(z)?], default_extent)),
        [x, y, z, extent] => Ok(([number(x)?, number(y)?, number(z)?], number(extent)?)),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Parses one coordinate or extent.
fn number(s: &str) -> Result<f64, ParseError> {
    s.parse().map_err(|_| ParseError::NotANumber(s.to_owned()))
}

/// `[-x] <name> <code...>`
fn text_block(args: &str) -> Result<Call, ParseError> {
    const USAGE: &str = "create_text_block [-x] <name> <code...>";

    let (execute, tail) = match args.strip_prefix("-x") {
        Some(r) if r.is_empty() || r.starts_with(char::is_whitespace) => (true, r.trim_start()),
        _ => (false, args),
    };
    let (name, code) = tail
        .split_once(char::is_whitespace)
        .map(|(name, code)| (name, code.trim()))
        .ok_or(ParseError::Usage(USAGE))?;
    if code.is_empty() {
        return Err(ParseError::Usage(USAGE));
    }
    Ok(Call::CreateTextBlock {
        name: name.to_owned(),
        code: code.to_owned(),
        execute,
    })
}

/// Writes a command outcome the way the shell shows it.
pub(crate) fn report(
    out: &mut impl Write,
    result: scenelink::Result<Option<Value>>,
) -> io::Result<()> {
    match result {
        Ok(Some(value)) => writeln!(out, "{value}"),
        Ok(None) => writeln!(out, "ok"),
        Err(e) => writeln!(out, "error: {e}"),
    }
}

/// Runs the shell until `exit` or end of input.
///
/// Fails only when the target address cannot be resolved or the terminal
/// itself breaks; command errors are printed and the loop continues.
pub(crate) fn run(sender: &Sender, input: impl BufRead, mut out: impl Write) -> Result<()> {
    sender
        .resolve()
        .with_context(|| format!("cannot resolve {}", sender.target()))?;

    writeln!(
        out,
        "scenelink shell: {} as {} ({})",
        sender.target(),
        sender.issuer(),
        chrono::Local::now().format(TIMESTAMP_FORMAT),
    )?;
    writeln!(out, "type `help` for commands, `exit` to quit")?;

    let mut lines = input.lines();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            writeln!(out)?;
            return Ok(());
        };
        match parse_line(&line?) {
            Ok(Line::Empty) => {}
            Ok(Line::Help) => out.write_all(HELP.as_bytes())?,
            Ok(Line::Exit) => return Ok(()),
            Ok(Line::Call(call)) => report(&mut out, call.invoke(sender))?,
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;

    fn call(line: &str) -> Call {
        match parse_line(line) {
            Ok(Line::Call(call)) => call,
            other => panic!("{line:?} parsed as {other:?}"),
        }
    }

    #[test]
    fn blank_and_control_lines() {
        assert_eq!(parse_line("   "), Ok(Line::Empty));
        assert_eq!(parse_line("help"), Ok(Line::Help));
        assert_eq!(parse_line("EXIT"), Ok(Line::Exit));
        assert_eq!(parse_line("quit"), Ok(Line::Exit));
    }

    #[test]
    fn primitives_take_zero_three_or_four_numbers() {
        assert_eq!(
            call("create_cube"),
            Call::CreateCube {
                location: [0.0; 3],
                size: 2.0
            }
        );
        assert_eq!(
            call("Create_Cube 1 -2 3.5"),
            Call::CreateCube {
                location: [1.0, -2.0, 3.5],
                size: 2.0
            }
        );
        assert_eq!(
            call("create_sphere 0 0 1 0.25"),
            Call::CreateSphere {
                location: [0.0, 0.0, 1.0],
                radius: 0.25
            }
        );
        assert!(matches!(
            parse_line("create_cube 1 2"),
            Err(ParseError::Usage(_))
        ));
        assert_eq!(
            parse_line("create_sphere 1 two 3"),
            Err(ParseError::NotANumber("two".to_owned()))
        );
    }

    #[test]
    fn code_is_taken_verbatim() {
        assert_eq!(
            call("execute_code  return  1 +  2 "),
            Call::ExecuteCode {
                code: "return  1 +  2".to_owned()
            }
        );
        assert!(matches!(
            parse_line("execute_code"),
            Err(ParseError::Usage(_))
        ));
    }

    #[test]
    fn render_path_defaults() {
        assert_eq!(
            call("render_scene"),
            Call::RenderScene {
                filepath: "//render.png".to_owned()
            }
        );
        assert_eq!(
            call("render_scene /tmp/my frame.png"),
            Call::RenderScene {
                filepath: "/tmp/my frame.png".to_owned()
            }
        );
    }

    #[test]
    fn text_block_flags_and_name() {
        assert_eq!(
            call("create_text_block -x setup.lua scene.delete_all()"),
            Call::CreateTextBlock {
                name: "setup.lua".to_owned(),
                code: "scene.delete_all()".to_owned(),
                execute: true,
            }
        );
        assert_eq!(
            call("create_text_block -xy.lua return 1"),
            Call::CreateTextBlock {
                name: "-xy.lua".to_owned(),
                code: "return 1".to_owned(),
                execute: false,
            }
        );
        assert!(matches!(
            parse_line("create_text_block only_a_name"),
            Err(ParseError::Usage(_))
        ));
        assert_eq!(
            call("execute_text_block setup.lua"),
            Call::ExecuteTextBlock {
                name: "setup.lua".to_owned()
            }
        );
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert_eq!(
            parse_line("summon_dragon now"),
            Err(ParseError::Unknown("summon_dragon".to_owned()))
        );
        assert!(matches!(parse_line("delete_all now"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn shell_survives_failures_until_exit() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let sender = Sender::new("127.0.0.1", port).timeout(Duration::from_millis(200));
        let input = Cursor::new("bogus\n\ncreate_cube\nhelp\nexit\ndelete_all\n");
        let mut out = Vec::new();

        run(&sender, input, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("unknown command `bogus`"), "{out}");
        assert!(out.contains("error: connection error"), "{out}");
        assert!(out.contains("execute_text_block <name>"), "{out}");
        // `delete_all` comes after `exit` and is never attempted.
        assert_eq!(out.matches("error:").count(), 2, "{out}");
    }

    #[test]
    fn end_of_input_ends_shell() {
        let sender = Sender::new("127.0.0.1", 9);
        let mut out = Vec::new();
        run(&sender, Cursor::new(""), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.ends_with(&format!("{PROMPT}\n")), "{out:?}");
    }

    #[test]
    fn report_formats_outcomes() {
        let mut out = Vec::new();
        report(&mut out, Ok(Some(Value::from("Cube")))).unwrap();
        report(&mut out, Ok(None)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Cube\nok\n");
    }
}
