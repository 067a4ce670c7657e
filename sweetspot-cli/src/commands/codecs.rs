//! Implementation of the `codecs` subcommand.

use console::style;

use sweetspot_core::codecs::{CodecSpec, OptionKind, all_codecs};

fn describe_kind(kind: &OptionKind) -> String {
    match kind {
        OptionKind::Integer { min, max } => format!("integer {min}..={max}"),
        OptionKind::Float { min, max } => format!("number {min}..={max}"),
        OptionKind::Choice(choices) => choices.join("|"),
        OptionKind::Flag => "flag".to_string(),
    }
}

/// Multi-line listing of one codec.
pub fn describe_codec(codec: &CodecSpec) -> String {
    let mut out = format!(
        "{} ({})\n  {} {}, presets (fastest first): {}\n  default preset: {}",
        codec.name,
        codec.display_name,
        codec.rate_control,
        codec.quality_range,
        codec.presets.join(", "),
        codec.default_preset
    );
    if let Some(vendor) = codec.hardware {
        out.push_str(&format!("\n  hardware: {vendor:?}"));
        if let Some(limit) = vendor.session_limit() {
            out.push_str(&format!(" (max {limit} concurrent sessions)"));
        }
    }
    for option in codec.advanced_options {
        out.push_str(&format!(
            "\n  -o {}=<{}>  {}",
            option.key,
            describe_kind(&option.kind),
            option.label
        ));
        if let Some(default) = option.default {
            out.push_str(&format!(" (encoder default {default})"));
        }
    }
    out
}

pub fn run_codecs() {
    for codec in all_codecs() {
        let text = describe_codec(codec);
        let (head, rest) = text.split_once('\n').unwrap_or((text.as_str(), ""));
        println!("{}", style(head).bold());
        if !rest.is_empty() {
            println!("{rest}");
        }
        println!();
    }
}
