//! spec.md §8 scenario 1: overriding through `Super`.

use polyloft::converter::to_display_string;

#[test]
fn super_call_chains_into_subclass_result() {
    let value = test_utils::eval_ok(
        r#"
        class A {
            fn greet(): String { return "A" }
        }
        class B extends A {
            override fn greet(): String { return super.greet() + "B" }
        }
        B().greet();
        "#,
    );
    assert_eq!(to_display_string(&value), "AB");
}
