//! WGSL source loading.
//!
//! Shader sources are plain text assets addressed by a path relative to the
//! library root. A line of the form `// #include "common/fullscreen.wgsl"`
//! is replaced by the contents of the named file.

use std::fs;
use std::path::{Path, PathBuf};

use super::{GfxError, GraphicsDevice, ProgramDesc};
use crate::diagnostics::{self, DiagnosticKind};

const INCLUDE_DIRECTIVE: &str = "// #include";
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    root: PathBuf,
}

impl ShaderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads `path` and expands its includes.
    pub fn load(&self, path: &str) -> Result<String, GfxError> {
        let mut stack = Vec::new();
        self.load_recursive(path, &mut stack)
    }

    fn load_recursive(&self, path: &str, stack: &mut Vec<String>) -> Result<String, GfxError> {
        if stack.len() >= MAX_INCLUDE_DEPTH || stack.iter().any(|p| p == path) {
            return Err(GfxError::IncludeDepth(path.to_string()));
        }

        let full_path = self.root.join(path);
        let text = match fs::read_to_string(&full_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GfxError::ShaderNotFound(full_path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        stack.push(path.to_string());
        let mut output = String::with_capacity(text.len());
        for line in text.lines() {
            match parse_include(line) {
                Some(included) => {
                    let source = self.load_recursive(included, stack)?;
                    output.push_str(&source);
                }
                None => output.push_str(line),
            }
            output.push('\n');
        }
        stack.pop();

        Ok(output)
    }

    /// Loads and compiles a program, reporting failures instead of
    /// propagating them. `None` means the owning layer runs without it.
    pub fn build<D: GraphicsDevice>(
        &self,
        device: &mut D,
        desc: &ProgramDesc,
    ) -> Option<D::Program> {
        let result = self
            .load(&desc.path)
            .and_then(|source| device.create_program(desc, &source));

        match result {
            Ok(program) => {
                tracing::debug!("Program '{}' ready", desc.label);
                Some(program)
            }
            Err(e) => {
                diagnostics::report(
                    DiagnosticKind::Resource,
                    format!("program '{}' unavailable: {}", desc.label, e),
                );
                None
            }
        }
    }
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(INCLUDE_DIRECTIVE)?;
    let rest = rest.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}
