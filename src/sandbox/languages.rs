//! Per-language toolchain commands
//!
//! The supported language set is closed: C++, Java, Python. Each handler
//! knows its source file name, compile invocation and run invocation. The
//! Python "compile" step is a syntax check so that broken sources still
//! produce a compilation_error verdict instead of failing on test one.

use std::path::Path;

use crate::models::Language;

/// Toolchain handler for one language
#[derive(Debug, Clone, Copy)]
pub struct LanguageHandler {
    language: Language,
}

impl LanguageHandler {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Canonical source file name inside the working directory
    pub fn source_file(&self) -> &'static str {
        match self.language {
            Language::Cpp => "main.cpp",
            Language::Java => "Main.java",
            Language::Python => "main.py",
        }
    }

    /// Compile command, executed with the working directory as cwd
    pub fn compile_command(&self) -> Vec<String> {
        match self.language {
            Language::Cpp => vec![
                "g++".into(),
                "-O2".into(),
                "-std=c++17".into(),
                "-o".into(),
                "main".into(),
                "main.cpp".into(),
            ],
            Language::Java => vec!["javac".into(), "Main.java".into()],
            Language::Python => vec![
                "python3".into(),
                "-m".into(),
                "py_compile".into(),
                "main.py".into(),
            ],
        }
    }

    /// Run command referencing the artifact directory by absolute path.
    /// The JVM ignores RLIMIT_AS, so its ceiling rides in -Xmx instead.
    pub fn run_command(&self, artifact_dir: &Path, memory_limit_mb: u64) -> Vec<String> {
        match self.language {
            Language::Cpp => vec![artifact_dir.join("main").display().to_string()],
            Language::Java => vec![
                "java".into(),
                format!("-Xmx{}m", memory_limit_mb),
                "-cp".into(),
                artifact_dir.display().to_string(),
                "Main".into(),
            ],
            Language::Python => vec![
                "python3".into(),
                artifact_dir.join("main.py").display().to_string(),
            ],
        }
    }

    /// Whether RLIMIT_AS is a usable memory ceiling for this language
    pub fn uses_address_space_limit(&self) -> bool {
        !matches!(self.language, Language::Java)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_compile_commands() {
        let cpp = LanguageHandler::new(Language::Cpp);
        assert_eq!(cpp.source_file(), "main.cpp");
        assert!(cpp.compile_command().contains(&"g++".to_string()));

        let py = LanguageHandler::new(Language::Python);
        assert!(py.compile_command().contains(&"py_compile".to_string()));

        let java = LanguageHandler::new(Language::Java);
        assert_eq!(java.source_file(), "Main.java");
        assert!(!java.uses_address_space_limit());
    }

    #[test]
    fn test_run_commands() {
        let dir = PathBuf::from("/tmp/artifact");

        let cpp = LanguageHandler::new(Language::Cpp);
        assert_eq!(cpp.run_command(&dir, 256), vec!["/tmp/artifact/main"]);

        let java = LanguageHandler::new(Language::Java);
        let cmd = java.run_command(&dir, 256);
        assert!(cmd.contains(&"-Xmx256m".to_string()));
        assert!(cmd.contains(&"Main".to_string()));
    }
}
