/// A non-blank, non-comment source line split into whitespace-delimited tokens
#[derive(Debug, Eq, PartialEq)]
pub struct Line<'a> {
    /// 1-based physical line number
    pub number: usize,
    pub tokens: Vec<&'a str>,
}

pub struct Lexer<'a> {
    program: &'a str,
    cursor: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(program: &'a str) -> Self {
        Lexer {
            program,
            cursor: 0,
            line: 0,
        }
    }

    /// Get the next line that carries tokens. Blank lines and lines whose first
    /// byte is `#` are skipped; an indented `#` is an ordinary token.
    pub fn next_line(&mut self) -> Option<Line<'a>> {
        while self.cursor < self.program.len() {
            self.line += 1;

            if self.next_char(true) == Some(b'#') {
                self.skip_line();
                continue;
            }
            self.trim();

            let mut tokens = Vec::new();
            while let Some(token) = self.read_token() {
                tokens.push(token);
                self.trim();
            }
            // Consume the newline, if any
            let _ = self.next_char(false);

            if !tokens.is_empty() {
                return Some(Line {
                    number: self.line,
                    tokens,
                });
            }
        }

        None
    }

    /// Trim whitespaces, tabs, carriage returns, control chars
    fn trim(&mut self) {
        while let Some(ch) = self.next_char(true) {
            if ch != b'\t' && ch != b'\r' && ch != b'\x0B' && ch != b'\x0C' && ch != b' ' {
                break;
            }
            self.cursor += 1;
        }
    }

    /// Read a token up to the next whitespace or newline
    fn read_token(&mut self) -> Option<&'a str> {
        let start_pos = self.cursor;
        while let Some(ch) = self.next_char(true) {
            if ch.is_ascii_whitespace() || ch == b'\x0B' {
                break;
            }
            self.cursor += 1;
        }

        // Splitting on ASCII bytes always lands on a char boundary
        if self.cursor > start_pos {
            Some(&self.program[start_pos..self.cursor])
        } else {
            None
        }
    }

    /// Skip everything up to and including the next newline
    fn skip_line(&mut self) {
        while let Some(ch) = self.next_char(false) {
            if ch == b'\n' {
                break;
            }
        }
    }

    /// Get the next char and increase the cursor if `peek` is false
    fn next_char(&mut self, peek: bool) -> Option<u8> {
        if let Some(ch) = self.program.as_bytes().get(self.cursor) {
            if !peek {
                self.cursor += 1;
            }
            Some(*ch)
        } else {
            None
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim() {
        let program = "\t\r\x0C load 5";
        let mut lexer = Lexer::new(program);
        lexer.trim();
        assert_eq!(&lexer.program[lexer.cursor..], "load 5");
    }

    #[test]
    fn read_token() {
        let program = "protocol\tmain\n";
        let mut lexer = Lexer::new(program);
        assert_eq!(lexer.read_token(), Some("protocol"));
        lexer.trim();
        assert_eq!(lexer.read_token(), Some("main"));
        assert_eq!(lexer.read_token(), None);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let program = "# header\n\n   \nprotocol main\n#comment\ninstruct load 5\n";
        let lines: Vec<Line> = Lexer::new(program).collect();

        assert_eq!(
            lines,
            vec![
                Line {
                    number: 4,
                    tokens: vec!["protocol", "main"],
                },
                Line {
                    number: 6,
                    tokens: vec!["instruct", "load", "5"],
                },
            ]
        );
    }

    #[test]
    fn indented_hash_is_not_a_comment() {
        let program = "protocol p\n  # note\n\t#\n";
        let lines: Vec<Line> = Lexer::new(program).collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].tokens, vec!["#", "note"]);
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[2].tokens, vec!["#"]);
    }

    #[test]
    fn crlf_and_missing_trailing_newline() {
        let program = "protocol p\r\ninstruct add\r\nguide x y";
        let lines: Vec<Line> = Lexer::new(program).collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].tokens, vec!["protocol", "p"]);
        assert_eq!(lines[1].tokens, vec!["instruct", "add"]);
        assert_eq!(lines[2].tokens, vec!["guide", "x", "y"]);
        assert_eq!(lines[2].number, 3);
    }

    #[test]
    fn utf8_tokens() {
        let program = "state größe 12\n";
        let line = Lexer::new(program).next_line().unwrap();
        assert_eq!(line.tokens, vec!["state", "größe", "12"]);
    }
}
