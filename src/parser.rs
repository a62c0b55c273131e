use crate::{
    error::{AsmError, AsmErrorKind},
    image::{ProgramImage, PROM_SIZE},
    isa::{encode, encode_imm, Format, Opcode},
    symbol::{is_label, LabelTable, Register, RegisterError, Span},
};

type Result<T> = std::result::Result<T, AsmError>;

/// Assemble source text into a program image.
pub fn assemble(src: &str) -> Result<ProgramImage> {
    AsmParser::new(src)?.parse()
}

/// A line that holds an instruction, as opposed to a blank or comment line.
#[derive(Clone, Copy, Debug)]
struct SrcLine<'a> {
    /// 1-based physical line number
    line: usize,
    /// Trimmed text
    text: &'a str,
}

/// One operand token. Operands produced by pseudo-instruction expansion borrow the
/// span of the mnemonic they came from.
#[derive(Clone, Copy, Debug)]
struct Operand<'a> {
    text: &'a str,
    span: Span,
}

/// Two-pass assembler. [`AsmParser::new`] resolves labels, [`AsmParser::parse`] encodes.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Significant lines, in order. Index in here is the program memory address.
    lines: Vec<SrcLine<'a>>,
    labels: LabelTable,
}

impl<'a> AsmParser<'a> {
    /// First pass: collect significant lines and record where each label points.
    pub fn new(src: &'a str) -> Result<Self> {
        if src.is_empty() {
            return Err(AsmError::new(1, Span::new(0, 0), AsmErrorKind::EmptySource));
        }

        let mut lines = Vec::new();
        let mut labels = LabelTable::new();

        for (idx, raw) in src.lines().enumerate() {
            let text = raw.trim();
            if !is_significant(text) {
                continue;
            }
            if lines.len() == PROM_SIZE {
                return Err(AsmError::new(
                    idx + 1,
                    Span::of(src, text),
                    AsmErrorKind::ProgramTooLong { max: PROM_SIZE },
                ));
            }
            if let Some(first) = text.split_whitespace().next().filter(|tok| is_label(tok)) {
                // Fits: there are at most 256 significant lines
                labels.insert(first, lines.len() as u8);
            }
            lines.push(SrcLine {
                line: idx + 1,
                text,
            });
        }

        Ok(AsmParser { src, lines, labels })
    }

    /// Labels found by the first pass.
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Second pass: encode every significant line into the image.
    pub fn parse(self) -> Result<ProgramImage> {
        let words = self
            .lines
            .iter()
            .map(|line| self.parse_line(*line))
            .collect::<Result<Vec<u16>>>()?;
        // First pass already capped the line count
        Ok(ProgramImage::from_words(&words).expect("program fits in memory"))
    }

    fn span(&self, part: &str) -> Span {
        Span::of(self.src, part)
    }

    fn err(&self, line: SrcLine, span: Span, kind: AsmErrorKind) -> AsmError {
        AsmError::new(line.line, span, kind)
    }

    fn parse_line(&self, line: SrcLine<'a>) -> Result<u16> {
        let mut toks = line.text.split_whitespace().peekable();

        // Label has already been recorded
        let label = toks.next_if(|tok| is_label(tok));
        let Some(mnemonic) = toks.next() else {
            // `text` is non-empty, so a missing mnemonic means the line was a lone label
            let label = label.unwrap_or(line.text);
            return Err(self.err(
                line,
                self.span(label),
                AsmErrorKind::MissingInstruction {
                    label: label.to_owned(),
                },
            ));
        };
        let mnemonic_span = self.span(mnemonic);
        let ops: Vec<Operand> = toks
            .map(|text| Operand {
                text,
                span: self.span(text),
            })
            .collect();

        let (mnemonic, ops) = self.expand_pseudo(line, mnemonic, mnemonic_span, ops)?;

        let Some(op) = Opcode::from_mnemonic(mnemonic) else {
            return Err(self.err(
                line,
                mnemonic_span,
                AsmErrorKind::UnknownInstruction {
                    mnemonic: mnemonic.to_owned(),
                },
            ));
        };

        let format = op.format();
        self.expect_operands(line, mnemonic, format.operand_count(), ops.len())?;

        // Extra trailing operands are ignored
        let word = match format {
            Format::Ab => {
                let a = self.expect_reg(line, ops[0])?;
                let b = self.expect_reg(line, ops[1])?;
                encode(op, a, b, 0)
            }
            Format::Ca => {
                let c = self.expect_reg(line, ops[0])?;
                let a = self.expect_reg(line, ops[1])?;
                encode(op, a, 0, c)
            }
            Format::Cab => {
                let c = self.expect_reg(line, ops[0])?;
                let a = self.expect_reg(line, ops[1])?;
                let b = self.expect_reg(line, ops[2])?;
                encode(op, a, b, c)
            }
            Format::CImm => {
                let c = self.expect_reg(line, ops[0])?;
                let imm = self.expect_imm(line, ops[1])?;
                encode_imm(op, imm, c)
            }
            Format::ImmC => {
                let imm = self.expect_imm(line, ops[0])?;
                let c = self.expect_reg(line, ops[1])?;
                encode_imm(op, imm, c)
            }
        };
        Ok(word)
    }

    /// Rewrite `NOP`, `MOV`, `JMP` and `EXIT` into the real instruction they stand for.
    fn expand_pseudo(
        &self,
        line: SrcLine,
        mnemonic: &'a str,
        span: Span,
        ops: Vec<Operand<'a>>,
    ) -> Result<(&'a str, Vec<Operand<'a>>)> {
        let fixed = |text: &'a str| Operand { text, span };
        let expanded = match mnemonic {
            "NOP" => ("ADD", vec![fixed("r0"), fixed("r0"), fixed("r0")]),
            "MOV" => {
                self.expect_operands(line, mnemonic, 2, ops.len())?;
                ("ADD", vec![ops[0], fixed("r0"), ops[1]])
            }
            "JMP" => {
                self.expect_operands(line, mnemonic, 1, ops.len())?;
                ("BEQ", vec![ops[0], fixed("r15")])
            }
            "EXIT" => ("JMPL", vec![fixed("r0"), fixed("r0")]),
            _ => (mnemonic, ops),
        };
        Ok(expanded)
    }

    fn expect_operands(
        &self,
        line: SrcLine,
        mnemonic: &str,
        expected: usize,
        found: usize,
    ) -> Result<()> {
        if found >= expected {
            return Ok(());
        }
        Err(self.err(
            line,
            self.span(line.text),
            AsmErrorKind::NotEnoughArguments {
                mnemonic: mnemonic.to_owned(),
                expected,
                found,
            },
        ))
    }

    fn expect_reg(&self, line: SrcLine, op: Operand) -> Result<u8> {
        match op.text.parse::<Register>() {
            Ok(reg) => Ok(reg.index()),
            Err(RegisterError::NotANumber) => Err(self.err(
                line,
                op.span,
                AsmErrorKind::InvalidRegister {
                    token: op.text.to_owned(),
                },
            )),
            Err(RegisterError::OutOfRange) => Err(self.err(
                line,
                op.span,
                AsmErrorKind::RegisterOutOfRange {
                    token: op.text.to_owned(),
                },
            )),
        }
    }

    /// Decimal literal 0-255, or a label reference resolving to its line index.
    fn expect_imm(&self, line: SrcLine, op: Operand) -> Result<u8> {
        if is_label(op.text) {
            return self.labels.get(op.text).ok_or_else(|| {
                self.err(
                    line,
                    op.span,
                    AsmErrorKind::UnknownLabel {
                        label: op.text.to_owned(),
                    },
                )
            });
        }
        let all_digits = op.text.bytes().all(|b| b.is_ascii_digit());
        match op.text.parse::<u8>() {
            Ok(val) if all_digits => Ok(val),
            _ => Err(self.err(
                line,
                op.span,
                AsmErrorKind::ImmediateParseFailure {
                    token: op.text.to_owned(),
                },
            )),
        }
    }
}

/// Non-empty and not a whole-line comment. Expects trimmed input.
fn is_significant(text: &str) -> bool {
    !(text.is_empty() || text.starts_with('#') || text.starts_with("//"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::EXIT_WORD;

    fn kind(src: &str) -> AsmErrorKind {
        assemble(src).unwrap_err().kind
    }

    #[test]
    fn add_basic() {
        let image = assemble("ADD r1 r2 r3").unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.program(), &[0x0231]);
        assert!(image.words()[1..].iter().all(|&w| w == 0));
    }

    #[test]
    fn every_format() {
        let image = assemble(
            r#"
            ADD r1 r2 r3
            RSFT r4 r5
            IMM r6 200
            ST r7 r8
            STIM 17 r9
            LDIM 1 3
            OUT 2 r14
            "#,
        )
        .unwrap();
        assert_eq!(
            image.program(),
            &[0x0231, 0x5504, 0x6C86, 0x9780, 0xA119, 0x8031, 0xF2E0]
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let image = assemble(
            "# header\n\n   // indented comment\nNOP\n\t\n# trailing\nEXIT\n",
        )
        .unwrap();
        assert_eq!(image.program(), &[0x0000, EXIT_WORD]);
    }

    #[test]
    fn pseudo_instructions() {
        assert_eq!(
            assemble("NOP").unwrap().program(),
            assemble("ADD r0 r0 r0").unwrap().program()
        );
        assert_eq!(assemble("EXIT").unwrap().program(), &[EXIT_WORD]);
        assert_eq!(
            assemble("MOV r3 r4").unwrap().program(),
            assemble("ADD r3 r0 r4").unwrap().program()
        );
        assert_eq!(
            assemble("top: JMP top:").unwrap().program(),
            assemble("BEQ 0 r15").unwrap().program()
        );
    }

    #[test]
    fn forward_label() {
        let image = assemble("BEQ target: r15\ntarget: ADD r0 r0 r0\n").unwrap();
        assert_eq!(image.len(), 2);
        assert_eq!(image.program()[0], encode_imm(Opcode::Beq, 1, 15));
    }

    #[test]
    fn label_index_counts_significant_lines_only() {
        let parser = AsmParser::new(
            r#"
            # comment
            start: IMM r1 1

            // comment
            loop: ADD r2 r2 r1
                  BGT loop: r2
            end:  EXIT
            "#,
        )
        .unwrap();
        assert_eq!(parser.labels().get("start:"), Some(0));
        assert_eq!(parser.labels().get("loop:"), Some(1));
        assert_eq!(parser.labels().get("end:"), Some(3));
        let image = parser.parse().unwrap();
        assert_eq!(image.program()[2], encode_imm(Opcode::Bgt, 1, 2));
    }

    #[test]
    fn label_redefinition_last_wins() {
        let image = assemble("a: NOP\na: NOP\nJMP a:").unwrap();
        assert_eq!(image.program()[2], encode_imm(Opcode::Beq, 1, 15));
    }

    #[test]
    fn label_only_line_is_rejected() {
        let err = assemble("BEQ target: r15\ntarget:\nADD r0 r0 r0\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(
            err.kind,
            AsmErrorKind::MissingInstruction {
                label: "target:".into()
            }
        );
    }

    #[test]
    fn labels_are_case_sensitive() {
        assert_eq!(
            kind("Loop: NOP\nJMP loop:"),
            AsmErrorKind::UnknownLabel {
                label: "loop:".into()
            }
        );
    }

    #[test]
    fn unknown_instruction() {
        let err = assemble("NOP\n\nadd r1 r2 r3").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(
            err.kind,
            AsmErrorKind::UnknownInstruction {
                mnemonic: "add".into()
            }
        );
        assert_eq!(err.span, Span::new(5, 3));
    }

    #[test]
    fn not_enough_arguments() {
        assert_eq!(
            kind("ADD r1 r2"),
            AsmErrorKind::NotEnoughArguments {
                mnemonic: "ADD".into(),
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            kind("BEQ 3"),
            AsmErrorKind::NotEnoughArguments {
                mnemonic: "BEQ".into(),
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            kind("MOV r1"),
            AsmErrorKind::NotEnoughArguments {
                mnemonic: "MOV".into(),
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            kind("JMP"),
            AsmErrorKind::NotEnoughArguments {
                mnemonic: "JMP".into(),
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn extra_operands_are_ignored() {
        assert_eq!(assemble("RSFT r1 r2 r3").unwrap().program(), &[0x5201]);
    }

    #[test]
    fn bad_registers() {
        assert_eq!(
            kind("ADD r1 r16 r3"),
            AsmErrorKind::RegisterOutOfRange {
                token: "r16".into()
            }
        );
        assert_eq!(
            kind("ADD r1 rx r3"),
            AsmErrorKind::InvalidRegister { token: "rx".into() }
        );
        let err = assemble("MOV r1 x").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::InvalidRegister { token: "x".into() });
        assert_eq!(err.span, Span::new(7, 1));
    }

    #[test]
    fn bad_immediates() {
        assert_eq!(
            kind("IMM r1 256"),
            AsmErrorKind::ImmediateParseFailure {
                token: "256".into()
            }
        );
        assert_eq!(
            kind("IMM r1 0x10"),
            AsmErrorKind::ImmediateParseFailure {
                token: "0x10".into()
            }
        );
        assert_eq!(
            kind("IMM r1 +1"),
            AsmErrorKind::ImmediateParseFailure { token: "+1".into() }
        );
        assert_eq!(assemble("IMM r1 255").unwrap().program(), &[0x6FF1]);
    }

    #[test]
    fn empty_source() {
        assert_eq!(kind(""), AsmErrorKind::EmptySource);
        assert_eq!(assemble("").unwrap_err().line, 1);
    }

    #[test]
    fn comment_only_source_has_no_instructions() {
        for src in ["# nothing but a comment\n", "  \n# only comments\n// here\n", "   \n\n"] {
            let image = assemble(src).unwrap();
            assert_eq!(image.len(), 0);
            assert!(image.words().iter().all(|&w| w == 0));
        }
    }

    #[test]
    fn program_length_ceiling() {
        let full = "NOP\n".repeat(PROM_SIZE);
        let image = assemble(&full).unwrap();
        assert_eq!(image.len(), PROM_SIZE);

        let too_long = format!("# prologue\n{full}EXIT\n");
        let err = assemble(&too_long).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::ProgramTooLong { max: PROM_SIZE });
        assert_eq!(err.line, PROM_SIZE + 2);
    }

    #[test]
    fn length_matches_significant_lines() {
        for n in [1, 2, 17, 255] {
            let src = "# c\nIMM r1 1\n\n".repeat(n);
            let image = assemble(&src).unwrap();
            assert_eq!(image.len(), n);
            assert!(image.words()[n..].iter().all(|&w| w == 0));
        }
    }
}
