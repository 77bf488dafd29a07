//! spec.md §3/§4.5 invariant coverage not already exercised by the scenario
//! tests: short-circuit evaluation and deferred-action LIFO ordering at
//! program scope.

use polyloft::converter::to_display_string;

#[test]
fn or_short_circuits_and_skips_right_side_effect() {
    let value = test_utils::eval_ok(
        r#"
        let log = [];
        fn mark(tag: String): Bool {
            log.push(tag);
            return true;
        }
        let result = mark("left") || mark("right");
        log;
        "#,
    );
    assert_eq!(to_display_string(&value), "[left]");
}

#[test]
fn and_short_circuits_and_skips_right_side_effect() {
    let value = test_utils::eval_ok(
        r#"
        let log = [];
        fn mark(tag: String, outcome: Bool): Bool {
            log.push(tag);
            return outcome;
        }
        let result = mark("left", false) && mark("right", true);
        log;
        "#,
    );
    assert_eq!(to_display_string(&value), "[left]");
}

#[test]
fn defers_run_in_reverse_order() {
    let value = test_utils::eval_ok(
        r#"
        let log = [];
        fn run(): Array {
            defer log.push("first");
            defer log.push("second");
            defer log.push("third");
            return log;
        }
        run();
        "#,
    );
    assert_eq!(to_display_string(&value), "[third, second, first]");
}

#[test]
fn final_binding_rejects_mutation_of_an_already_set_field() {
    let exc = test_utils::eval_err(
        r#"
        class Box {
            let value: Int;
            fn Box(value: Int) { this.value = value; }
        }
        final b = Box(1);
        b.value = 2;
        "#,
    );
    assert!(
        exc.message.contains("value") && exc.message.contains('b'),
        "unexpected message: {}",
        exc.message
    );
}

#[test]
fn bytes_literal_supports_length_and_indexing() {
    let value = test_utils::eval_ok(
        r#"
        let b = 0xFF01;
        [b.length(), b[0], b[1]];
        "#,
    );
    assert_eq!(to_display_string(&value), "[2, 255, 1]");
}
