//! Keyword fallback analyzer
//!
//! Answers without a model by matching the dream text against a fixed table
//! of symbols. Output is a pure function of the input: the header, one
//! sentence per matched symbol in table order (or the generic sentence), a
//! blank line and the advice block.

/// Leading line of every fallback answer
pub const HEADER: &str = "梦境解析：";

/// Sentence used when no symbol matches
pub const GENERIC_SENTENCE: &str =
    "这个梦境可能与您最近的生活经历和情感状态有关，反映了您内心深处尚未被充分觉察的需求。";

/// Advice appended to every fallback answer
pub const ADVICE: &str = "心理学建议：\n\
1. 可以尝试记录梦境日记，帮助更好地理解自己的内心世界。\n\
2. 关注自己的情绪健康，适当进行放松和调节，保持规律的作息。\n\
3. 如果梦境持续影响您的情绪或睡眠，建议寻求专业心理咨询。";

/// One row of the symbol table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DreamSymbol {
    /// Short identifier
    pub name: &'static str,
    /// Case-sensitive substrings that select this symbol
    pub triggers: &'static [&'static str],
    /// Sentence contributed to the answer
    pub sentence: &'static str,
}

impl DreamSymbol {
    /// Whether any trigger occurs in `text`
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.triggers.iter().any(|t| text.contains(t))
    }
}

/// Symbol table in output order
pub const SYMBOLS: &[DreamSymbol] = &[
    DreamSymbol {
        name: "snake",
        triggers: &["蛇", "snake"],
        sentence: "梦见蛇通常象征着紧张与焦虑，可能意味着生活中存在让您感到不安或受到威胁的人和事。",
    },
    DreamSymbol {
        name: "chase",
        triggers: &["追", "chase"],
        sentence: "被追赶的梦往往反映出您在现实中想要逃避某种压力、责任或未解决的冲突。",
    },
    DreamSymbol {
        name: "falling",
        triggers: &["坠落", "掉下", "falling"],
        sentence: "坠落的梦常与失控感和不安全感有关，提示您可能对某件事缺乏把握。",
    },
    DreamSymbol {
        name: "exam",
        triggers: &["考试", "exam"],
        sentence: "梦见考试多与自我评价和对表现的担忧相关，说明您可能正面临被检验的处境。",
    },
    DreamSymbol {
        name: "flying",
        triggers: &["飞", "flying"],
        sentence: "飞翔的梦通常代表对自由与突破的渴望，也可能反映您正在摆脱某种束缚。",
    },
    DreamSymbol {
        name: "teeth",
        triggers: &["牙", "teeth"],
        sentence: "梦见牙齿脱落常与对外表、衰老或失去掌控的担忧有关。",
    },
];

/// Deterministic keyword-based interpreter
#[derive(Debug, Clone, Copy)]
pub struct FallbackAnalyzer {
    symbols: &'static [DreamSymbol],
}

impl Default for FallbackAnalyzer {
    fn default() -> Self {
        Self { symbols: SYMBOLS }
    }
}

impl FallbackAnalyzer {
    /// Analyzer over the built-in table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbols matched by `text`, in table order
    #[must_use]
    pub fn matched(&self, text: &str) -> Vec<&'static DreamSymbol> {
        self.symbols.iter().filter(|s| s.matches(text)).collect()
    }

    /// Produce the fallback interpretation for `text`
    #[must_use]
    pub fn analyze(&self, text: &str) -> String {
        let matched = self.matched(text);
        let mut out = String::from(HEADER);
        if matched.is_empty() {
            out.push_str(GENERIC_SENTENCE);
        } else {
            for symbol in matched {
                out.push_str(symbol.sentence);
            }
        }
        out.push_str("\n\n");
        out.push_str(ADVICE);
        out
    }
}
