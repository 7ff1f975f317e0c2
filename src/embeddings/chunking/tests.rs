use super::*;

#[test]
fn empty_input_produces_no_chunks() {
    assert!(generate_chunks("").is_empty());
    assert!(generate_chunks("   ").is_empty());
    assert!(generate_chunks("\n\t").is_empty());
    assert_eq!(chunk_count(""), 0);
}

#[test]
fn input_without_terminator_is_single_trimmed_chunk() {
    assert_eq!(
        generate_chunks("  Leather boxing gloves for sparring  "),
        vec!["Leather boxing gloves for sparring".to_string()]
    );
}

#[test]
fn splits_on_period_and_preserves_order() {
    let chunks = generate_chunks("Pro Gloves. Everlast. Sixteen ounce gloves for heavy bag work.");
    assert_eq!(
        chunks,
        vec![
            "Pro Gloves".to_string(),
            "Everlast".to_string(),
            "Sixteen ounce gloves for heavy bag work".to_string(),
        ]
    );
}

#[test]
fn only_terminators_yield_nothing() {
    assert!(generate_chunks("...").is_empty());
    assert!(generate_chunks(" . . ").is_empty());
}

#[test]
fn consecutive_terminators_are_collapsed() {
    assert_eq!(
        generate_chunks("Hand wraps.. Mouth guard. "),
        vec!["Hand wraps".to_string(), "Mouth guard".to_string()]
    );
}

#[test]
fn decimal_prices_are_split() {
    // Known over-segmentation of the period rule
    assert_eq!(
        generate_chunks("Now only 49.99 dollars"),
        vec!["Now only 49".to_string(), "99 dollars".to_string()]
    );
}

#[test]
fn japanese_full_stop_is_not_a_terminator() {
    assert_eq!(
        generate_chunks("ボクシンググローブ。軽量モデル。"),
        vec!["ボクシンググローブ。軽量モデル。".to_string()]
    );
}

#[test]
fn newlines_inside_segments_are_kept() {
    assert_eq!(
        generate_chunks("Line one\nstill one. Line two"),
        vec!["Line one\nstill one".to_string(), "Line two".to_string()]
    );
}

#[test]
fn lazy_and_eager_agree() {
    let text = "Heavy bag. Chains included. 100 lb fill.";
    let lazy: Vec<&str> = chunks(text).collect();
    let eager = generate_chunks(text);
    assert_eq!(lazy, eager);
    assert_eq!(chunk_count(text), eager.len());
    assert!(eager.iter().all(|c| !c.is_empty() && c.trim() == c));
}
