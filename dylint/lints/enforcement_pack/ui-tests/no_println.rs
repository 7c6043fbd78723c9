// Test case for NO_PRINTLN lint

fn bad_println(trace_id: &str) {
    println!("trail delivered: {trace_id}");
}

fn bad_eprintln() {
    eprintln!("sink write failed");
}

fn bad_print() {
    print!("queue full");
}

fn bad_dbg() {
    let body = "{\"password\":\"hunter2\"}";
    dbg!(body);
}

// Good: using tracing
fn good_tracing(trace_id: &str) {
    tracing::info!(trace_id = %trace_id, "trail delivered");
}

fn main() {
    bad_println("trace-1");
    bad_eprintln();
    bad_print();
    bad_dbg();
    good_tracing("trace-1");
}
