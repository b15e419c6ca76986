use std::sync::OnceLock;

use regex::Regex;

pub const HELP_TEXT: &str = "*Available Commands:*\n\
    /start \\- Start or reset the bot\n\
    /help \\- Show this help message\n\
    /contract \\- Set contract context for chain analysis\n\n\
    *How to use:*\n\
    1\\. Start with the /start command\n\
    2\\. Chat directly with the assistant\n\
    3\\. To analyze a contract, use /contract and follow the prompts\n\n\
    *Contract Analysis:*\n\
    When you set a contract context, all subsequent questions will be answered in the context of that contract\\.\n\n\
    *Note:*\n\
    This bot is in beta\\. Please report any issues to the developer\\.\n\
    *Disclaimer:*\n\
    This bot is for educational purposes only\\. Use at your own risk\\.\n\
    *Privacy Policy:*\n\
    Your data is used only to provide the bot's functionality and is not shared with third parties\\.";

/// Escapes every character MarkdownV2 reserves, plus the bullet backends like to emit.
pub fn escape_markdown_v2(text: &str) -> String {
    let specials = [
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
        '\\', '•',
    ];
    let mut out = String::with_capacity(text.len() * 2);

    for ch in text.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Splits on character boundaries into pieces of at most `limit` characters,
/// never leaving a dangling escape backslash at the end of a piece.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut len = 0;

    for ch in text.chars() {
        if len >= limit && !ends_inside_escape(&current) {
            chunks.push(std::mem::take(&mut current));
            len = 0;
        }
        current.push(ch);
        len += 1;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn ends_inside_escape(text: &str) -> bool {
    text.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// `0x` followed by exactly 40 hex digits, either case.
pub fn is_valid_contract_address(address: &str) -> bool {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    ADDRESS
        .get_or_init(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("static regex"))
        .is_match(address)
}

/// Positive base-10 chain id, surrounding whitespace ignored.
pub fn parse_chain_id(text: &str) -> Option<u64> {
    text.trim().parse::<u64>().ok().filter(|&id| id > 0)
}
