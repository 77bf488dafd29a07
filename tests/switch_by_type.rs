//! spec.md §8 scenario 6: a `switch` type-bound case rebinds the subject and
//! runs the first case whose type matches, in declaration order.

use polyloft::converter::to_display_string;

#[test]
fn switch_dispatches_on_matching_type_case() {
    let value = test_utils::eval_ok(
        r#"
        fn describe(x: Any): Int {
            switch x {
                case n: Int:
                    return n * 2;
                case s: String:
                    return 0;
            }
            return -1;
        }
        describe(21);
        "#,
    );
    assert_eq!(to_display_string(&value), "42");
}

#[test]
fn switch_falls_to_default_when_no_case_matches() {
    let value = test_utils::eval_ok(
        r#"
        fn describe(x: Any): Int {
            switch x {
                case n: Int:
                    return n * 2;
                default:
                    return -1;
            }
        }
        describe(true);
        "#,
    );
    assert_eq!(to_display_string(&value), "-1");
}
