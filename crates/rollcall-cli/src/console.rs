//! Line-oriented operator console for the kiosk loop.

use rollcall_core::{FaceSample, SessionStats};
use rollcall_kiosk::{Command, Outcome, SessionEvents};
use std::io::BufRead;
use tokio::sync::mpsc;

pub const HELP: &str = "\
commands:
  scan                            identify the face in front of the camera now
  register <id>, <name>[, dept]   enroll the unknown face and mark it present
  cancel                          discard the unknown face
  end                             verify the session owner and close the session
  abort                           stop exit verification and keep scanning
  quit                            leave without closing the session";

/// Parse one console line. `None` for blank or unknown input.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word.to_ascii_lowercase().as_str() {
        "scan" | "s" => Some(Command::Scan),
        "register" | "r" => {
            let mut fields = rest.split(',').map(str::trim);
            let id = fields.next().unwrap_or_default().to_string();
            let name = fields.next().unwrap_or_default().to_string();
            let department = fields.next().unwrap_or_default().to_string();
            Some(Command::Register { id, name, department })
        }
        "cancel" => Some(Command::CancelRegistration),
        "end" => Some(Command::EndSession),
        "abort" => Some(Command::CancelExit),
        "quit" | "q" | "exit" => Some(Command::Shutdown),
        _ => None,
    }
}

/// Forward stdin lines to the session until stdin closes or the session
/// stops listening.
///
/// Runs on a plain thread; a pending stdin read must not hold up runtime
/// shutdown.
pub fn spawn_stdin(tx: mpsc::Sender<Command>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("rollcall-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(cmd) => {
                        if tx.blocking_send(cmd).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("{HELP}"),
                }
            }
        })?;
    Ok(())
}

/// Sends `Shutdown` on Ctrl-C.
pub fn spawn_interrupt(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Command::Shutdown).await;
        }
    });
}

/// Prints session events for the operator.
#[derive(Default)]
pub struct ConsoleEvents {
    last_reason: Option<String>,
}

impl SessionEvents for ConsoleEvents {
    fn on_identified(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Identified {
                student_id,
                name,
                already_marked: false,
            } => println!("✓ Attendance Recorded: {name} ({student_id})"),
            Outcome::Identified {
                student_id, name, ..
            } => println!("• Already Recorded: {name} ({student_id})"),
            Outcome::Registered { student_id, name } => {
                println!("✓ Welcome, {name} ({student_id}). Registered & Marked Present.")
            }
        }
    }

    fn on_registration_required(&mut self, _sample: &FaceSample) {
        println!("? Face not recognized. Type: register <id>, <name>[, department]  or  cancel");
    }

    fn on_session_closed(&mut self, stats: &SessionStats) {
        println!();
        println!(
            "Session closed: {}  {} to {}",
            stats.subject,
            stats.start_time.format("%H:%M"),
            stats.end_time.format("%H:%M")
        );
        println!(
            "Present {} / {}  (absent {})",
            stats.present_count,
            stats.total_students,
            stats.absent_count()
        );
        for s in &stats.absent_students {
            println!("  absent: {:<12} {}", s.id, s.name);
        }
    }

    fn on_exit_progress(&mut self, progress: u8, reason: Option<&str>) {
        match reason {
            Some(reason) if self.last_reason.as_deref() != Some(reason) => {
                println!("  exit verification: {reason}");
                self.last_reason = Some(reason.to_string());
            }
            Some(_) => {}
            None => {
                self.last_reason = None;
                if progress % 50 == 0 {
                    println!("  exit verification: {progress}%");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        assert_eq!(
            parse_command("register CS-001, Ada Lovelace, CSE"),
            Some(Command::Register {
                id: "CS-001".into(),
                name: "Ada Lovelace".into(),
                department: "CSE".into(),
            })
        );
        // Missing fields are left for the session to reject.
        assert_eq!(
            parse_command("r CS-002"),
            Some(Command::Register {
                id: "CS-002".into(),
                name: String::new(),
                department: String::new(),
            })
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("  SCAN "), Some(Command::Scan));
        assert_eq!(parse_command("end"), Some(Command::EndSession));
        assert_eq!(parse_command("abort"), Some(Command::CancelExit));
        assert_eq!(parse_command("cancel"), Some(Command::CancelRegistration));
        assert_eq!(parse_command("q"), Some(Command::Shutdown));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("dance"), None);
    }
}
