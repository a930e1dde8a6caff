//! Turns raw tick telemetry into a [`Context`] and its [`FeatureVector`].
//!
//! All numeric outputs are rounded to three decimals so that logged contexts
//! stay stable across runs.

use sentinel_core::telemetry::ExecutionAttempt;
use sentinel_core::{round_to, Context, Difficulty, ErrorKind, FeatureVector, FEATURE_DIM};

/// Pause length (seconds) treated as a full stall.
pub const PAUSE_STALL_SECS: f64 = 60.0;
/// Hint count at which the normalized hint feature saturates.
pub const HINT_SATURATION: f64 = 3.0;

const LONG_LINE_CHARS: usize = 120;
const LONG_LINE_PENALTY: f64 = 0.25;
const TODO_PENALTY: f64 = 0.20;
const MIXED_INDENT_PENALTY: f64 = 0.10;
const DEBUG_PRINT_PENALTY: f64 = 0.05;
const DEBUG_PRINT_CAP: usize = 3;

/// Call prefixes counted as leftover debug output. `print(` is only counted
/// when it is a bare call (see [`count_debug_prints`]).
const DEBUG_PRINT_MARKERS: [&str; 5] = [
    "console.log(",
    "println!(",
    "dbg!(",
    "System.out.print",
    "fmt.Print",
];

/// Telemetry of one tick, borrowed from the incoming request.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub code: &'a str,
    pub attempts: &'a [ExecutionAttempt],
    pub pause_duration: f64,
    pub hints_used: u32,
    pub difficulty: Difficulty,
    pub total_changes: u64,
}

/// Builds the context and its encoded feature vector.
#[must_use]
pub fn extract(input: &TickInput<'_>) -> (Context, FeatureVector) {
    let ctx = build_context(input);
    let features = encode(&ctx);
    (ctx, features)
}

#[must_use]
pub fn build_context(input: &TickInput<'_>) -> Context {
    let pause_length = if input.pause_duration.is_finite() {
        input.pause_duration.max(0.0)
    } else {
        0.0
    };
    Context {
        pause_length: round_to(pause_length, 3),
        pause_norm: round_to((pause_length / PAUSE_STALL_SECS).min(1.0), 3),
        cleanliness: cleanliness_score(input.code),
        fail_rate: failure_rate(input.attempts),
        error_type: categorize_error(input.attempts),
        difficulty: input.difficulty,
        hints_used: input.hints_used,
        total_changes: input.total_changes,
    }
}

/// Encodes a context positionally, see [`sentinel_core::FEATURE_NAMES`].
#[must_use]
pub fn encode(ctx: &Context) -> FeatureVector {
    let mut slots = [0.0; FEATURE_DIM];
    slots[0] = ctx.pause_norm;
    slots[1] = ctx.cleanliness;
    slots[2] = ctx.fail_rate;
    slots[3] = round_to((f64::from(ctx.hints_used) / HINT_SATURATION).min(1.0), 3);
    slots[4] = ctx.difficulty.normalized();
    if let Some(slot) = ctx.error_type.one_hot_slot() {
        slots[slot] = 1.0;
    }
    FeatureVector(slots)
}

/// Heuristic readability score in `[0, 1]`. Empty code scores 0.0.
#[must_use]
pub fn cleanliness_score(code: &str) -> f64 {
    if code.trim().is_empty() {
        return 0.0;
    }

    let lines: Vec<&str> = code
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let total = lines.len() as f64;

    let long = lines
        .iter()
        .filter(|l| l.chars().count() > LONG_LINE_CHARS)
        .count();
    let markers = lines
        .iter()
        .filter(|l| l.contains("TODO") || l.contains("FIXME"))
        .count();
    let mixed = lines.iter().filter(|l| mixes_indentation(l)).count();
    let prints = count_debug_prints(code).min(DEBUG_PRINT_CAP);

    #[allow(clippy::cast_precision_loss)]
    let score = 1.0
        - (long as f64 / total) * LONG_LINE_PENALTY
        - (markers as f64 / total) * TODO_PENALTY
        - (mixed as f64 / total) * MIXED_INDENT_PENALTY
        - prints as f64 * DEBUG_PRINT_PENALTY;

    round_to(score.clamp(0.0, 1.0), 3)
}

fn mixes_indentation(line: &str) -> bool {
    let indent: &str = &line[..line.len() - line.trim_start_matches([' ', '\t']).len()];
    indent.contains(' ') && indent.contains('\t')
}

/// Counts debug-print call sites. A `print(` preceded by an identifier
/// character or `.` (e.g. `pprint(`, `self.print(`) is not counted.
#[must_use]
pub fn count_debug_prints(code: &str) -> usize {
    let bare_prints = code
        .match_indices("print(")
        .filter(|(idx, _)| {
            code[..*idx]
                .chars()
                .next_back()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '.'))
        })
        .count();
    let others: usize = DEBUG_PRINT_MARKERS
        .iter()
        .map(|m| code.matches(m).count())
        .sum();
    bare_prints + others
}

/// Fraction of attempts that failed or reported an error.
#[must_use]
pub fn failure_rate(attempts: &[ExecutionAttempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    let failed = attempts.iter().filter(|a| a.is_failure()).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = failed as f64 / attempts.len() as f64;
    round_to(rate, 3)
}

/// Categorizes the error text of the latest failing attempt that has one.
#[must_use]
pub fn categorize_error(attempts: &[ExecutionAttempt]) -> ErrorKind {
    attempts
        .iter()
        .rev()
        .filter(|a| a.is_failure())
        .find_map(|a| a.error.as_deref())
        .map_or(ErrorKind::None, classify_error_text)
}

/// Case-insensitive substring classification, first match wins.
#[must_use]
pub fn classify_error_text(text: &str) -> ErrorKind {
    let text = text.to_lowercase();
    if text.contains("syntax") || text.contains("parse") {
        ErrorKind::Syntax
    } else if text.contains("timeout") {
        ErrorKind::Timeout
    } else if text.contains("assert") || text.contains("expect") {
        ErrorKind::EdgeCase
    } else {
        // typeerror, valueerror and anything unrecognized
        ErrorKind::Runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(passed: bool, error: Option<&str>) -> ExecutionAttempt {
        ExecutionAttempt {
            passed,
            error: error.map(str::to_string),
        }
    }

    fn input<'a>(code: &'a str, attempts: &'a [ExecutionAttempt], pause: f64) -> TickInput<'a> {
        TickInput {
            code,
            attempts,
            pause_duration: pause,
            hints_used: 0,
            difficulty: Difficulty::Medium,
            total_changes: 0,
        }
    }

    #[test]
    fn empty_code_scores_zero() {
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(cleanliness_score(""), 0.0);
            assert_eq!(cleanliness_score("  \n\t\n"), 0.0);
            assert_eq!(cleanliness_score("def f(x): pass"), 1.0);
        }
    }

    #[test]
    fn cleanliness_penalties_stack() {
        let long = "x".repeat(121);
        // 4 lines: one long, one TODO, one mixed indent, two prints
        let code = format!("{long}\n# TODO fix\n \tprint(1)\nprint(2)");
        let expected = 1.0 - 0.25 / 4.0 - 0.20 / 4.0 - 0.10 / 4.0 - 2.0 * 0.05;
        assert!((cleanliness_score(&code) - round_to(expected, 3)).abs() < 1e-9);
    }

    #[test]
    fn debug_prints_are_capped() {
        let code = "print(1)\nprint(2)\nconsole.log(3)\ndbg!(4)\nprintln!(\"{}\", 5)";
        assert_eq!(count_debug_prints(code), 5);
        assert!((cleanliness_score(code) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn prefixed_print_calls_are_not_debug_output() {
        assert_eq!(count_debug_prints("pprint(x)\nself.print(y)\nsprint(z)"), 0);
        assert_eq!(count_debug_prints("System.out.println(x);"), 1);
    }

    #[test]
    fn failure_rate_counts_errors_on_passed_attempts() {
        let attempts = [
            attempt(true, None),
            attempt(true, Some("AssertionError")),
            attempt(false, None),
            attempt(true, None),
        ];
        assert!((failure_rate(&attempts) - 0.5).abs() < 1e-12);
        assert!(failure_rate(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn error_categories_follow_precedence() {
        assert_eq!(classify_error_text("SyntaxError: invalid"), ErrorKind::Syntax);
        assert_eq!(classify_error_text("could not PARSE input"), ErrorKind::Syntax);
        assert_eq!(
            classify_error_text("Execution timeout (5 seconds)"),
            ErrorKind::Timeout
        );
        assert_eq!(classify_error_text("AssertionError"), ErrorKind::EdgeCase);
        assert_eq!(classify_error_text("expected 3 got 4"), ErrorKind::EdgeCase);
        assert_eq!(classify_error_text("TypeError: ..."), ErrorKind::Runtime);
        assert_eq!(classify_error_text("ValueError"), ErrorKind::Runtime);
        assert_eq!(classify_error_text("Segfault"), ErrorKind::Runtime);
    }

    #[test]
    fn categorize_uses_latest_failing_attempt_with_text() {
        let attempts = [
            attempt(false, Some("SyntaxError")),
            attempt(false, Some("Execution timeout")),
            attempt(false, None),
            attempt(true, None),
        ];
        assert_eq!(categorize_error(&attempts), ErrorKind::Timeout);
        assert_eq!(categorize_error(&[attempt(false, None)]), ErrorKind::None);
        assert_eq!(categorize_error(&[]), ErrorKind::None);
    }

    #[test]
    fn type_error_scenario_encodes_runtime() {
        let attempts = [attempt(false, Some("TypeError: ..."))];
        let (ctx, features) = extract(&input("def f(x): pass", &attempts, 50.0));
        assert_eq!(ctx.error_type, ErrorKind::Runtime);
        assert!((ctx.pause_norm - 0.833).abs() < 1e-12);
        assert_eq!(features.get("error_runtime"), Some(1.0));
        assert_eq!(features.get("pause_norm"), Some(0.833));
        assert_eq!(features.get("fail_rate"), Some(1.0));
    }

    #[test]
    fn timeout_one_hot_is_exclusive() {
        let attempts = [attempt(false, Some("timeout"))];
        let (_, f) = extract(&input("x = 1", &attempts, 0.0));
        assert_eq!(&f.0[5..], &[0.0, 0.0, 0.0, 1.0]);

        let (_, f) = extract(&input("x = 1", &[], 0.0));
        assert_eq!(&f.0[5..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalization_saturates() {
        let mut tick = input("x = 1", &[], 600.0);
        tick.hints_used = 7;
        tick.difficulty = Difficulty::Hard;
        let (ctx, f) = extract(&tick);
        assert!((ctx.pause_norm - 1.0).abs() < f64::EPSILON);
        assert!((ctx.pause_length - 600.0).abs() < f64::EPSILON);
        assert_eq!(f.get("hints_norm"), Some(1.0));
        assert_eq!(f.get("difficulty_norm"), Some(0.8));

        tick.pause_duration = f64::NAN;
        tick.hints_used = 1;
        let (ctx, f) = extract(&tick);
        assert!(ctx.pause_norm.abs() < f64::EPSILON);
        assert_eq!(f.get("hints_norm"), Some(0.333));
    }
}
