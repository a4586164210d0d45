use elicast_engine::{Operation, Timestamp};

/// A session that types `chars` characters one at a time, moving the cursor
/// after each keystroke.
#[allow(dead_code)]
pub fn typing_session(chars: usize) -> Vec<Operation> {
    let mut ops = vec![Operation::record_start(0, 0, 0, 0)];
    for i in 0..chars {
        let ts = (i as Timestamp + 1) * 10;
        let ch = if i % 40 == 39 { "\n" } else { "x" };
        ops.push(Operation::insert(ts, i, ch));
        ops.push(Operation::selection(ts + 1, i + 1, i + 1));
    }
    ops.push(Operation::record_end((chars as Timestamp + 1) * 10));
    ops
}

/// Answers that place every ambiguous operation right where it was.
#[allow(dead_code)]
pub fn echo_choices(ops: &[Operation]) -> Vec<Operation> {
    ops.iter()
        .filter(|op| op.as_text().is_some() || op.as_selection().is_some())
        .cloned()
        .collect()
}
