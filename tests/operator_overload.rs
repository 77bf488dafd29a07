//! spec.md §8 scenario 4: operator overloading via the conventional method
//! name an operator resolves to (`+` -> `add`).

use polyloft::converter::to_display_string;

#[test]
fn plus_dispatches_to_overloaded_add_method() {
    let value = test_utils::eval_ok(
        r#"
        class V {
            let x: Int;
            fn V(x: Int) { this.x = x; }
            fn add(o: V): V { return V(this.x + o.x) }
        }
        (V(2) + V(3)).x;
        "#,
    );
    assert_eq!(to_display_string(&value), "5");
}
