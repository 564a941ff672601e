// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! uloop_process behaviour under the full runtime

mod common;

use common::host;

#[tokio::test]
async fn test_true_exits_zero() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_process(|status| { record(status); uloop_end(); }, ["true"]);
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![0]);
}

#[tokio::test]
async fn test_exec_failure_reports_127() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            record(uloop_process(|status| { record(status); uloop_end(); }, ["/nonexistent/binary"]));
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![0, 127]);
}

#[tokio::test]
async fn test_exit_status_and_private() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_process(|status, tag| {
                record(status);
                record(tag);
                uloop_end();
            }, ["sh", "-c", "exit 5"], "job");
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    let values = recorder.values();
    assert_eq!(values[0].as_int().unwrap(), 5);
    assert_eq!(values[1].clone().into_string().unwrap(), "job");
}

#[tokio::test]
async fn test_argv_elements_stringified() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_process(|status| { record(status); uloop_end(); }, ["sh", "-c", "exit $0", 6]);
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![6]);
}

#[tokio::test]
async fn test_several_children() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            let left = 3;
            for code in [1, 2, 3] {
                uloop_process(|status| {
                    record(status);
                    left -= 1;
                    if left == 0 { uloop_end(); }
                }, ["sh", "-c", "exit " + code]);
            }
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    let mut codes = recorder.ints();
    codes.sort();
    assert_eq!(codes, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_bad_arguments() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            record(uloop_process(|status| (), "true"));
            record(uloop_process(5, ["true"]));
            record(uloop_process(|status| (), []));
            uloop_end();
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![-1, -1, -1]);
}
