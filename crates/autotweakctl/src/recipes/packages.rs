//! Package manager steps, picked by whichever manager is installed

use super::program_exists;
use autotweak_common::{CommandMode, StepOutcome, SystemHost, TweakSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Pacman,
    Dnf,
}

impl PackageManager {
    /// First manager found on PATH, checked in apt-get, pacman, dnf order
    pub fn detect<H: SystemHost + ?Sized>(host: &H) -> Option<Self> {
        [Self::Apt, Self::Pacman, Self::Dnf]
            .into_iter()
            .find(|pm| program_exists(host, pm.program()))
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Pacman => "pacman",
            Self::Dnf => "dnf",
        }
    }

    /// Cache cleanup and orphan removal, with the action logged for each
    pub fn cleanup_steps(&self) -> &'static [(&'static str, CommandMode, &'static str)] {
        match self {
            Self::Apt => &[
                ("apt-get clean", CommandMode::Direct, "Cleaned apt package cache"),
                ("apt-get autoremove -y", CommandMode::Direct, "Removed unused packages (apt)"),
            ],
            Self::Pacman => &[
                ("pacman -Sc --noconfirm", CommandMode::Direct, "Cleaned pacman package cache"),
                (
                    "orphans=$(pacman -Qtdq); [ -z \"$orphans\" ] || pacman -Rns --noconfirm $orphans",
                    CommandMode::Shell,
                    "Removed orphaned packages (pacman)",
                ),
            ],
            Self::Dnf => &[
                ("dnf clean all", CommandMode::Direct, "Cleaned dnf package cache"),
                ("dnf autoremove -y", CommandMode::Direct, "Removed unused packages (dnf)"),
            ],
        }
    }

    pub fn install_command(&self, packages: &[&str]) -> String {
        let prefix = match self {
            Self::Apt => "apt-get install -y",
            Self::Pacman => "pacman -S --needed --noconfirm",
            Self::Dnf => "dnf install -y",
        };
        format!("{} {}", prefix, packages.join(" "))
    }
}

/// Install `packages` with the detected manager
///
/// Returns `None`, after noting it, when no supported manager exists.
pub fn install<H: SystemHost + ?Sized>(
    session: &mut TweakSession<'_, H>,
    packages: &[&str],
) -> Option<StepOutcome> {
    let Some(pm) = PackageManager::detect(session.host()) else {
        session.note(&format!("No supported package manager found, {} not installed", packages.join(", ")));
        return None;
    };
    Some(session.run_action(
        &pm.install_command(packages),
        CommandMode::Direct,
        &format!("Installed {}", packages.join(", ")),
    ))
}
