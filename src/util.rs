use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

/// Seconds since the Unix epoch as a float, the timestamp unit Moonraker uses.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn local_time(secs: f64) -> Option<DateTime<Local>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|t| t.with_timezone(&Local))
}

/// `HH:MM:SS` in local time.
pub fn format_clock(secs: f64) -> String {
    local_time(secs).map_or_else(|| "--:--:--".to_string(), |t| t.format("%H:%M:%S").to_string())
}

/// `YYYY-MM-DD HH:MM` in local time.
pub fn format_datetime(secs: f64) -> String {
    local_time(secs).map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Human readable byte count (1024-based).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{value:.1} {unit}")
}

/// `H:MM:SS` for a duration in seconds.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Whether a listing argument is a wildcard pattern rather than a name.
pub fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Shell-style wildcard match: `*` any run, `?` one char, `[abc]`/`[a-z]`/`[!x]` a class.
/// Iterative with single-star backtracking, so pathological patterns stay linear-ish.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('[') => {
                if let Some((matched, next)) = match_class(&p, pi, t.get(ti).copied()) {
                    if matched {
                        pi = next;
                        ti += 1;
                        continue;
                    }
                } else if t.get(ti) == Some(&'[') {
                    // Unterminated class: literal '['.
                    pi += 1;
                    ti += 1;
                    continue;
                }
            }
            Some(c) if t.get(ti) == Some(c) => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }
    p.get(pi..).is_some_and(|rest| rest.iter().all(|&c| c == '*'))
}

/// Match `ch` against the bracket class starting at `p[start] == '['`.
/// Returns `(matched, index after ']')`, or `None` when the class is unterminated.
fn match_class(p: &[char], start: usize, ch: Option<char>) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(p.get(i), Some('!' | '^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let c = *p.get(i)?;
        if c == ']' && !first {
            break;
        }
        first = false;
        if p.get(i + 1) == Some(&'-') && p.get(i + 2).is_some_and(|&e| e != ']') {
            let end = *p.get(i + 2)?;
            if ch.is_some_and(|x| (c..=end).contains(&x)) {
                matched = true;
            }
            i += 3;
        } else {
            if ch == Some(c) {
                matched = true;
            }
            i += 1;
        }
    }
    Some((matched != negate && ch.is_some(), i + 1))
}

/// Levenshtein distance, single rolling row.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, a_ch) in a.chars().enumerate() {
        if let Some(first) = curr.first_mut() {
            *first = i + 1;
        }
        for (j, b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != *b_ch);
            let deletion = prev.get(j + 1).copied().unwrap_or(usize::MAX) + 1;
            let insertion = curr.get(j).copied().unwrap_or(usize::MAX) + 1;
            let substitution = prev.get(j).copied().unwrap_or(usize::MAX) + cost;
            if let Some(slot) = curr.get_mut(j + 1) {
                *slot = deletion.min(insertion).min(substitution);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev.last().copied().unwrap_or(0)
}

/// Quote a completion candidate when it contains whitespace.
pub fn quote_if_needed(s: &str) -> String {
    if s.contains(char::is_whitespace) {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}
