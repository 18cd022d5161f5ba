/// Compiler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    /// Apply the folding compressor to the generated stream
    pub folding: bool,
    /// Run the adaptive optimization gate after folding
    pub learning: bool,
    /// Base increment of the heuristic scores
    pub learning_rate: f32,
    /// Pipeline retries after a recovered structural error
    pub max_retries: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            folding: true,
            learning: true,
            learning_rate: 0.01,
            max_retries: 2,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    /// Restore the last checkpoint when an instruction fails
    pub self_healing: bool,
    /// Size of linear memory in bytes
    pub memory_size: usize,
    /// Checkpoint restorations allowed per run
    pub max_recoveries: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            self_healing: true,
            memory_size: 1024 * 1024,
            max_recoveries: 8,
        }
    }
}
