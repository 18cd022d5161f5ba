//! Symbol and overlay registry
//!
//! Overlays are precompiled opcode fragments bound to a keyword and a one-character
//! symbol. The registry owns every overlay; instructions refer to them by [`OverlayId`].

use anyhow::anyhow;
use std::collections::HashMap;
use tracing::debug;

/// Symbol returned for keywords that were never registered
pub const DEFAULT_SYMBOL: char = '0';

/// Index of an overlay in the registry
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct OverlayId(usize);

/// Named opcode fragment substitutable through a single-character symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub name: String,
    pub symbol: char,
    /// Bytes inlined verbatim after `OVERLAY_EXPAND`
    pub bytecode: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
}

impl Overlay {
    pub fn compression_ratio(&self) -> f32 {
        if self.original_size == 0 || self.compressed_size == 0 {
            1.0
        } else {
            self.original_size as f32 / self.compressed_size as f32
        }
    }
}

/// Hands out symbols in the order `0..=9`, `a`, then stays on `a`.
///
/// The advance rules cover `0-8`, `9 -> a`, `b -> c` and `c-y`. Nothing advances
/// `a` (or `z`), so the allocator stalls there and keeps returning it.
#[derive(Debug, Clone)]
pub struct SymbolAllocator {
    next: char,
}

impl Default for SymbolAllocator {
    fn default() -> Self {
        SymbolAllocator { next: '0' }
    }
}

impl SymbolAllocator {
    pub fn allocate(&mut self) -> char {
        let symbol = self.next;

        self.next = match self.next {
            '0'..='8' | 'c'..='y' => (self.next as u8 + 1) as char,
            '9' => 'a',
            'b' => 'c',
            stalled => stalled,
        };

        symbol
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    overlays: Vec<Overlay>,
    by_symbol: HashMap<char, OverlayId>,
    by_keyword: HashMap<String, OverlayId>,
    allocator: SymbolAllocator,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytecode` under `keyword` and bind it to the next free symbol.
    ///
    /// Fails when the allocator hands out a symbol that still belongs to a
    /// registered overlay.
    pub fn register(&mut self, keyword: &str, bytecode: impl Into<Vec<u8>>) -> anyhow::Result<char> {
        let symbol = self.allocator.allocate();
        if let Some(live) = self.by_symbol.get(&symbol) {
            return Err(anyhow!(
                "symbol '{}' is still bound to overlay '{}'; no free symbol for '{}'",
                symbol,
                self.overlays[live.0].name,
                keyword
            ));
        }

        let bytecode = bytecode.into();
        let id = OverlayId(self.overlays.len());
        self.overlays.push(Overlay {
            name: keyword.to_string(),
            symbol,
            original_size: bytecode.len(),
            compressed_size: bytecode.len(),
            bytecode,
        });
        self.by_symbol.insert(symbol, id);
        self.by_keyword.insert(keyword.to_string(), id);

        debug!(target: "framevm::registry", keyword, %symbol, "overlay registered");
        Ok(symbol)
    }

    /// Symbol bound to `keyword`, or [`DEFAULT_SYMBOL`] if it is unknown
    pub fn symbol_for(&self, keyword: &str) -> char {
        self.by_keyword
            .get(keyword)
            .map(|id| self.overlays[id.0].symbol)
            .unwrap_or(DEFAULT_SYMBOL)
    }

    /// Overlay currently bound to `symbol`
    pub fn overlay_for(&self, symbol: char) -> Option<&Overlay> {
        self.lookup(symbol).map(|id| self.get(id))
    }

    pub fn lookup(&self, symbol: char) -> Option<OverlayId> {
        self.by_symbol.get(&symbol).copied()
    }

    pub fn get(&self, id: OverlayId) -> &Overlay {
        &self.overlays[id.0]
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}
