//! Interactive control surface: activate, add a directory, exit.

use crate::supervisor::{AddOutcome, DirectorySupervisor, SupervisorState};
use crate::utils::Result;
use std::io::{BufRead, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::warn;

const MENU: &str = "Choose an action:
  (1) Activate backup manager
  (2) Add new directory
  (3) Exit
> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Activate,
    AddDirectory,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::Activate),
            "2" => Some(Self::AddDirectory),
            "3" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Read stdin lines on a dedicated thread.
///
/// The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Menu loop writing its prompts to `out`
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Run the menu until Exit is chosen or input ends
    pub async fn run(
        &mut self,
        supervisor: &mut DirectorySupervisor,
        input: &mut mpsc::Receiver<String>,
    ) -> Result<()> {
        writeln!(self.out, "Welcome to the Backup Manager!")?;

        loop {
            self.prompt(MENU)?;
            let Some(line) = input.recv().await else {
                return Ok(());
            };

            match MenuChoice::parse(&line) {
                Some(MenuChoice::Activate) => self.activate(supervisor).await?,
                Some(MenuChoice::AddDirectory) => {
                    self.prompt("Enter the directory path to add: ")?;
                    let Some(path) = input.recv().await else {
                        return Ok(());
                    };
                    self.add_directory(supervisor, path.trim()).await?;
                }
                Some(MenuChoice::Exit) => {
                    writeln!(self.out, "Exiting backup manager...")?;
                    return Ok(());
                }
                None => writeln!(self.out, "Invalid choice. Please try again.")?,
            }
        }
    }

    async fn activate(&mut self, supervisor: &mut DirectorySupervisor) -> Result<()> {
        let was_active = supervisor.state() == SupervisorState::Active;
        match supervisor.activate().await {
            Ok(_) if was_active => writeln!(
                self.out,
                "Backup manager is already active. Refreshing monitored directories."
            )?,
            Ok(_) => writeln!(self.out, "Your backup manager is now active and functioning!")?,
            Err(e) => writeln!(self.out, "Could not activate backup manager: {e}")?,
        }
        Ok(())
    }

    async fn add_directory(&mut self, supervisor: &mut DirectorySupervisor, path: &str) -> Result<()> {
        match supervisor.add_directory(Path::new(path)).await {
            Ok(AddOutcome::Added) => writeln!(self.out, "Added directory: {path}")?,
            Ok(AddOutcome::AlreadyExists) => {
                writeln!(self.out, "Directory is already being monitored.")?
            }
            Ok(AddOutcome::DoesNotExist) => writeln!(self.out, "Directory does not exist.")?,
            Err(e) => writeln!(self.out, "Could not add directory: {e}")?,
        }
        Ok(())
    }

    fn prompt(&mut self, text: &str) -> Result<()> {
        write!(self.out, "{text}")?;
        self.out.flush()?;
        Ok(())
    }
}
