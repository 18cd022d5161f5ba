//! Compilation pipeline: parse, group, generate, fold, optimize

use anyhow::Context;
use std::{fs, path::Path};
use tracing::{info, warn};

use crate::{
    bytecode, fold,
    help::HelpContext,
    options::CompilerOptions,
    parser::{build_protocols, Parser},
    registry::Registry,
};

/// Size figures of the last successful compilation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Source size in bytes
    pub original_size: usize,
    /// Artifact size in bytes
    pub compressed_size: usize,
}

impl Stats {
    pub fn compression_ratio(&self) -> f32 {
        if self.compressed_size == 0 {
            1.0
        } else {
            self.original_size as f32 / self.compressed_size as f32
        }
    }
}

pub struct Compiler {
    options: CompilerOptions,
    registry: Registry,
    help: HelpContext,
    stats: Stats,
    #[cfg(test)]
    injected_failures: u32,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        let help = HelpContext::new(options.learning_rate);
        Compiler {
            options,
            registry: Registry::new(),
            help,
            stats: Stats::default(),
            #[cfg(test)]
            injected_failures: 0,
        }
    }

    /// Register an overlay and return the symbol it is reachable under
    pub fn register_overlay(&mut self, keyword: &str, bytecode: impl Into<Vec<u8>>) -> anyhow::Result<char> {
        self.registry.register(keyword, bytecode)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn help(&self) -> &HelpContext {
        &self.help
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Compile source text into the final artifact bytes.
    ///
    /// A failing pipeline is retried only while the heuristic recovery makes a
    /// recommendation, and at most `max_retries` times.
    pub fn compile(&mut self, source: &str) -> anyhow::Result<Vec<u8>> {
        let mut retries = 0;
        loop {
            match self.run_pipeline(source) {
                Ok(artifact) => return Ok(artifact),
                Err(err) => {
                    warn!(target: "framevm::compiler", "compilation error: {:#}", err);
                    if retries >= self.options.max_retries || !self.attempt_error_recovery(&err) {
                        return Err(err);
                    }
                    info!(target: "framevm::compiler", "error recovered, retrying");
                    retries += 1;
                }
            }
        }
    }

    /// Read `input`, compile it and write the artifact to `output`. Only a
    /// written artifact counts as a compilation.
    pub fn compile_file(&mut self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let source = fs::read_to_string(input)
            .with_context(|| format!("failed to open source file {}", input.display()))?;

        let artifact = self.compile(&source)?;

        fs::write(output, &artifact)
            .with_context(|| format!("failed to open output file {}", output.display()))?;

        self.help.compilation_count += 1;
        self.help
            .record_event(format!("Compilation successful: {}", input.display()));
        Ok(())
    }

    fn run_pipeline(&mut self, source: &str) -> anyhow::Result<Vec<u8>> {
        #[cfg(test)]
        {
            if self.injected_failures > 0 {
                self.injected_failures -= 1;
                anyhow::bail!("injected pipeline failure");
            }
        }

        let instructions = Parser::new(source, &self.registry).parse();
        let protocols = build_protocols(&instructions);
        let generated = bytecode::generate(&protocols, &self.registry)?;

        let generated_size = generated.len();
        let mut folded = if self.options.folding {
            fold::fold(&generated)
        } else {
            generated
        };
        if self.options.learning {
            self.help.apply_optimizations(&mut folded);
        }

        self.stats = Stats {
            original_size: source.len(),
            compressed_size: folded.len(),
        };

        info!(
            target: "framevm::compiler",
            instructions = instructions.len(),
            protocols = protocols.len(),
            generated = generated_size,
            compressed = folded.len(),
            "compiled"
        );
        Ok(folded)
    }

    fn attempt_error_recovery(&mut self, error: &anyhow::Error) -> bool {
        let issue = error.to_string();
        self.help.learn_from_error(&issue);

        match self.help.recommend_fix(&issue) {
            Some(recommendation) => {
                self.help
                    .record_event(format!("Recovery attempted: {}", recommendation));
                true
            }
            None => false,
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(CompilerOptions::default())
    }
}
