use std::fmt;
use std::str::FromStr;

/// `en-US`, the language every resource is filed under unless configured otherwise.
pub const DEFAULT_LANGUAGE_ID: u16 = 0x0409;

/// Target architecture of the object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arch {
    #[default]
    I386,
    Amd64,
    Arm,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::I386, Arch::Amd64, Arch::Arm, Arch::Arm64];

    /// `IMAGE_FILE_HEADER.Machine`.
    pub fn machine(self) -> u16 {
        match self {
            Arch::I386 => 0x014c,
            Arch::Amd64 => 0x8664,
            Arch::Arm => 0x01c4,
            Arch::Arm64 => 0xaa64,
        }
    }

    /// The image-base-relative 32-bit relocation (`*_DIR32NB` / `*_ADDR32NB`).
    pub fn addr32nb_relocation(self) -> u16 {
        match self {
            Arch::I386 => 0x0007,
            Arch::Amd64 => 0x0003,
            Arch::Arm => 0x0002,
            Arch::Arm64 => 0x0002,
        }
    }

    pub fn is_32bit(self) -> bool {
        matches!(self, Arch::I386 | Arch::Arm)
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::I386 => "386",
            Arch::Amd64 => "amd64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "386" | "i386" | "x86" => Ok(Arch::I386),
            "amd64" | "x86_64" | "x64" => Ok(Arch::Amd64),
            "arm" => Ok(Arch::Arm),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!(
                "unknown architecture `{}`, expected one of: 386, amd64, arm, arm64",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsrcSettings {
    arch: Arch,
    language_id: u16,
}

impl Default for RsrcSettings {
    fn default() -> Self {
        RsrcSettings {
            arch: Arch::default(),
            language_id: DEFAULT_LANGUAGE_ID,
        }
    }
}

impl RsrcSettings {
    pub fn new() -> Self {
        RsrcSettings::default()
    }

    /// Sets the target architecture, which selects the machine and relocation type.
    pub fn arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    /// Sets the language id of the innermost resource directory.
    pub fn language_id(mut self, language_id: u16) -> Self {
        self.language_id = language_id;
        self
    }

    pub fn get_arch(&self) -> Arch {
        self.arch
    }

    pub fn get_language_id(&self) -> u16 {
        self.language_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_i386_en_us() {
        let settings = RsrcSettings::new();
        assert_eq!(settings.get_arch(), Arch::I386);
        assert_eq!(settings.get_language_id(), 0x0409);
        assert_eq!(settings.get_arch().machine(), 0x014c);
        assert_eq!(settings.get_arch().addr32nb_relocation(), 7);
    }

    #[test]
    fn test_parses_arch_aliases() {
        assert_eq!("386".parse::<Arch>().unwrap(), Arch::I386);
        assert_eq!("X86_64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert!("mips".parse::<Arch>().is_err());

        for arch in Arch::ALL {
            assert_eq!(arch.name().parse::<Arch>().unwrap(), arch);
        }
    }
}
