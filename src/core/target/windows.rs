//! Windows subsystem and entry point settings.

use serde::{Deserialize, Serialize};

use super::core::TargetKind;

/// Subsystem an executable is linked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum WindowsSubSystem {
    #[default]
    Console,
    Windows,
    BootApplication,
    Native,
    Posix,
    EfiApplication,
    EfiBootServiceDriver,
    EfiRom,
    EfiRuntimeDriver,
}

impl WindowsSubSystem {
    /// Spelling used by `link /subsystem:`.
    pub fn msvc_name(&self) -> &'static str {
        match self {
            WindowsSubSystem::Console => "console",
            WindowsSubSystem::Windows => "windows",
            WindowsSubSystem::BootApplication => "BOOT_APPLICATION",
            WindowsSubSystem::Native => "native",
            WindowsSubSystem::Posix => "posix",
            WindowsSubSystem::EfiApplication => "EFI_APPLICATION",
            WindowsSubSystem::EfiBootServiceDriver => "EFI_BOOT_SERVICE_DRIVER",
            WindowsSubSystem::EfiRom => "EFI_ROM",
            WindowsSubSystem::EfiRuntimeDriver => "EFI_RUNTIME_DRIVER",
        }
    }
}

/// User entry point of a Windows program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WindowsEntryPoint {
    #[default]
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "wmain")]
    MainUnicode,
    #[serde(rename = "WinMain")]
    WinMain,
    #[serde(rename = "wWinMain")]
    WinMainUnicode,
    #[serde(rename = "DllMain")]
    DllMain,
}

impl WindowsEntryPoint {
    pub fn is_unicode(&self) -> bool {
        matches!(
            self,
            WindowsEntryPoint::MainUnicode | WindowsEntryPoint::WinMainUnicode
        )
    }

    /// CRT startup symbol passed to `link /entry:`, if any.
    pub fn msvc_entry(&self, kind: TargetKind) -> Option<&'static str> {
        match kind {
            TargetKind::Executable => Some(match self {
                WindowsEntryPoint::MainUnicode => "wmainCRTStartup",
                WindowsEntryPoint::WinMain => "WinMainCRTStartup",
                WindowsEntryPoint::WinMainUnicode => "wWinMainCRTStartup",
                _ => "mainCRTStartup",
            }),
            TargetKind::SharedLibrary if *self == WindowsEntryPoint::DllMain => {
                Some("_DllMainCRTStartup")
            }
            _ => None,
        }
    }
}

/// Core libraries linked into every program targeting Windows.
pub const WIN32_CORE_LIBRARIES: &[&str] = &[
    "dbghelp", "kernel32", "user32", "gdi32", "winspool", "shell32", "ole32", "oleaut32", "uuid",
    "comdlg32", "advapi32",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msvc_entry_points() {
        assert_eq!(
            WindowsEntryPoint::Main.msvc_entry(TargetKind::Executable),
            Some("mainCRTStartup")
        );
        assert_eq!(
            WindowsEntryPoint::WinMainUnicode.msvc_entry(TargetKind::Executable),
            Some("wWinMainCRTStartup")
        );
        assert_eq!(
            WindowsEntryPoint::DllMain.msvc_entry(TargetKind::SharedLibrary),
            Some("_DllMainCRTStartup")
        );
        assert_eq!(WindowsEntryPoint::Main.msvc_entry(TargetKind::SharedLibrary), None);
        assert_eq!(WindowsEntryPoint::Main.msvc_entry(TargetKind::StaticLibrary), None);
    }

    #[test]
    fn test_subsystem_names() {
        assert_eq!(WindowsSubSystem::default().msvc_name(), "console");
        assert_eq!(WindowsSubSystem::EfiRom.msvc_name(), "EFI_ROM");
    }
}
