//! spec.md §8 scenario 2: covariant type parameters rejected in input
//! position, enforced at parameter-binding time.

#[test]
fn covariant_param_rejected_as_call_argument() {
    let exc = test_utils::eval_err(
        r#"
        class Box<out T> {
            fn put(x: T): Void { }
        }
        Box<Int>().put(1);
        "#,
    );
    assert!(
        exc.message.contains("covariant type parameter 'T'"),
        "unexpected message: {}",
        exc.message
    );
}

#[test]
fn covariant_param_declaration_alone_is_accepted() {
    test_utils::eval_ok(
        r#"
        class Box<out T> {
            fn put(x: T): Void { }
        }
        "#,
    );
}

#[test]
fn contravariant_return_type_rejected_at_declaration() {
    let exc = test_utils::eval_err(
        r#"
        class Sink<in T> {
            fn make(): T { return nil; }
        }
        "#,
    );
    assert!(
        exc.message.contains("contravariant type parameter 'T'"),
        "unexpected message: {}",
        exc.message
    );
}
