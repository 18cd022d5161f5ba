//! Source parser and protocol builder

use std::collections::HashMap;
use std::ops::Range;

use crate::{
    lexer::Lexer,
    registry::{OverlayId, Registry},
    token::{Kind, Token},
};

/// One non-blank, non-comment source line
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<'a> {
    pub kind: Kind,
    /// Second token of the line, empty if the line has only one token
    pub name: &'a str,
    pub params: Vec<&'a str>,
    /// Ordinal of this instruction among all parsed instructions
    pub range_start: u32,
    /// Always `range_start + 1`
    pub range_end: u32,
    /// 1-based physical source line
    pub line: usize,
    /// Overlay resolved from a single-character symbol token
    pub overlay: Option<OverlayId>,
}

/// Named group of instructions opened by a `protocol` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol<'a> {
    pub name: &'a str,
    /// Instructions following the declaration, up to the next declaration
    pub instructions: Vec<&'a Instruction<'a>>,
    /// Filled from `state <name> <value...>` instructions
    pub state_variables: HashMap<String, String>,
    pub range_scope: Range<u32>,
}

/// Parser to turn source text into instructions
pub struct Parser<'a, 'r> {
    lexer: Lexer<'a>,
    registry: &'r Registry,
}

impl<'a, 'r> Parser<'a, 'r> {
    /// * `program` source text to parse
    /// * `registry` overlays that single-character symbols resolve against
    pub fn new(program: &'a str, registry: &'r Registry) -> Self {
        Parser {
            lexer: Lexer::new(program),
            registry,
        }
    }

    /// Parse every line into an [`Instruction`]. Never fails: lines that make no
    /// sense still produce an instruction, with [`Kind::Unresolved`] if nothing
    /// else fits.
    pub fn parse(self) -> Vec<Instruction<'a>> {
        let mut instructions = Vec::new();
        let mut range_pos: u32 = 0;

        for line in self.lexer {
            let mut tokens = line.tokens.into_iter();
            let (kind, overlay) = match tokens.next().map(Token::new) {
                Some(Token::Keyword(kind)) => (kind, None),
                Some(Token::Symbol(symbol)) => (Kind::Overlay, self.registry.lookup(symbol)),
                _ => (Kind::Unresolved, None),
            };
            let name = tokens.next().unwrap_or("");
            let params = tokens.collect();

            let range_start = range_pos;
            range_pos = range_pos.saturating_add(1);

            instructions.push(Instruction {
                kind,
                name,
                params,
                range_start,
                range_end: range_pos,
                line: line.number,
                overlay,
            });
        }

        instructions
    }
}

/// Group instructions into protocols.
///
/// Instructions that come before the first `protocol` declaration belong to no
/// protocol and are dropped.
pub fn build_protocols<'a>(instructions: &'a [Instruction<'a>]) -> Vec<Protocol<'a>> {
    let mut protocols: Vec<Protocol<'a>> = Vec::new();

    for instruction in instructions {
        if instruction.kind == Kind::Protocol {
            protocols.push(Protocol {
                name: instruction.name,
                instructions: Vec::new(),
                state_variables: HashMap::new(),
                range_scope: instruction.range_end..instruction.range_end,
            });
            continue;
        }

        let Some(protocol) = protocols.last_mut() else {
            continue;
        };

        if instruction.kind == Kind::State && !instruction.name.is_empty() {
            protocol
                .state_variables
                .insert(instruction.name.to_string(), instruction.params.join(" "));
        }
        if protocol.instructions.is_empty() {
            protocol.range_scope.start = instruction.range_start;
        }
        protocol.range_scope.end = instruction.range_end;
        protocol.instructions.push(instruction);
    }

    protocols
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(program: &str) -> Vec<Instruction<'_>> {
        let registry = Registry::new();
        Parser::new(program, &registry).parse()
    }

    #[test]
    fn one_instruction_per_line() {
        let program = "# comment\nprotocol main\n\ninstruct load 5\ninstruct store 0\n";
        let instructions = parse(program);

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].kind, Kind::Protocol);
        assert_eq!(instructions[0].name, "main");
        assert_eq!(instructions[1].kind, Kind::Instruct);
        assert_eq!(instructions[1].name, "load");
        assert_eq!(instructions[1].params, vec!["5"]);
        assert_eq!(instructions[2].line, 5);
    }

    #[test]
    fn ranges_are_instruction_ordinals() {
        let instructions = parse("protocol p\n\n\nload\n# c\nstore\n");
        let ranges: Vec<(u32, u32)> = instructions
            .iter()
            .map(|i| (i.range_start, i.range_end))
            .collect();
        assert_eq!(ranges, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn parse_is_total() {
        let program = "!!!\n%%% ### ???\nX\n\u{1F600} smile\nprotocol\n";
        let instructions = parse(program);

        assert_eq!(instructions.len(), 5);
        assert!(instructions[..4].iter().all(|i| i.kind == Kind::Unresolved));
        assert_eq!(instructions[2].name, "");
        assert_eq!(instructions[4].kind, Kind::Protocol);
        assert_eq!(instructions[4].name, "");
    }

    #[test]
    fn indented_hash_line_is_an_instruction() {
        let instructions = parse("protocol p\n  # not at column 0\ninstruct add\n");

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[1].kind, Kind::Unresolved);
        assert_eq!(instructions[1].name, "not");
        assert_eq!(instructions[1].params, vec!["at", "column", "0"]);
        assert_eq!((instructions[2].range_start, instructions[2].range_end), (2, 3));
    }

    #[test]
    fn overlay_symbols_resolve() {
        let mut registry = Registry::new();
        registry.register("double", vec![0x03]).unwrap();

        let program = "protocol p\n0 double\n1 missing\n";
        let instructions = Parser::new(program, &registry).parse();

        assert_eq!(instructions[1].kind, Kind::Overlay);
        assert_eq!(instructions[1].overlay, registry.lookup('0'));
        assert!(instructions[1].overlay.is_some());

        // Valid symbol without a registered overlay
        assert_eq!(instructions[2].kind, Kind::Overlay);
        assert_eq!(instructions[2].overlay, None);
    }

    #[test]
    fn protocols_group_until_next_declaration() {
        let program = "load orphan\nprotocol first\nload 1\nadd\nprotocol second\npop\n";
        let instructions = parse(program);
        let protocols = build_protocols(&instructions);

        assert_eq!(protocols.len(), 2);
        assert_eq!(protocols[0].name, "first");
        let names: Vec<&str> = protocols[0].instructions.iter().map(|i| i.name).collect();
        // `load 1` has kind Unresolved, its name is the second token
        assert_eq!(names, vec!["1", ""]);
        assert_eq!(protocols[0].range_scope, 2..4);
        assert_eq!(protocols[1].name, "second");
        assert_eq!(protocols[1].instructions.len(), 1);
    }

    #[test]
    fn empty_protocol_scope() {
        let instructions = parse("protocol a\nprotocol b\ninstruct x\n");
        let protocols = build_protocols(&instructions);

        assert!(protocols[0].instructions.is_empty());
        assert_eq!(protocols[0].range_scope, 1..1);
        assert_eq!(protocols[1].range_scope, 2..3);
    }

    #[test]
    fn state_variables() {
        let program = "protocol p\nstate counter 0\nstate label hello world\ninstruct add\n";
        let instructions = parse(program);
        let protocols = build_protocols(&instructions);

        let vars = &protocols[0].state_variables;
        assert_eq!(vars.get("counter").map(String::as_str), Some("0"));
        assert_eq!(vars.get("label").map(String::as_str), Some("hello world"));
        assert_eq!(protocols[0].instructions.len(), 3);
    }

    #[test]
    fn nothing_before_first_protocol() {
        let instructions = parse("instruct load 1\ninstruct add\n");
        assert!(build_protocols(&instructions).is_empty());
    }
}
