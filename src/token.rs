/// Kind of a source instruction, decided by the first token of its line
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Kind {
    Instruct,
    Guide,
    State,
    Protocol,
    Bubble,
    Chain,
    Franchise,
    /// Single-character overlay symbol
    Overlay,
    /// Neither a keyword nor a valid symbol
    Unresolved,
}

/// Classified first token of a source line
#[derive(Debug, Eq, PartialEq)]
pub enum Token<'a> {
    Keyword(Kind),
    Symbol(char),
    Word(&'a str),
}

impl<'a> Token<'a> {
    pub fn new(token_str: &'a str) -> Self {
        match token_str.to_ascii_lowercase().as_str() {
            "instruct" => Token::Keyword(Kind::Instruct),
            "guide" => Token::Keyword(Kind::Guide),
            "state" => Token::Keyword(Kind::State),
            "protocol" => Token::Keyword(Kind::Protocol),
            "bubble" => Token::Keyword(Kind::Bubble),
            "chain" => Token::Keyword(Kind::Chain),
            "franchise" => Token::Keyword(Kind::Franchise),
            _ => {
                let mut chars = token_str.chars();
                match (chars.next(), chars.next()) {
                    (Some(symbol), None) if is_valid_symbol(symbol) => Token::Symbol(symbol),
                    _ => Token::Word(token_str),
                }
            }
        }
    }
}

/// Overlay symbols are drawn from `0-9`, `a-b` and `c-z`.
pub fn is_valid_symbol(symbol: char) -> bool {
    symbol.is_ascii_digit() || ('a'..='b').contains(&symbol) || ('c'..='z').contains(&symbol)
}
