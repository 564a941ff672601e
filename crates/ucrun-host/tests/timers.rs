// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! uloop_timeout behaviour under the full runtime

mod common;

use common::{host, Tracker};
use std::time::Duration;

#[tokio::test]
async fn test_integer_return_reschedules() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            let n = 0;
            uloop_timeout(|| {
                n += 1;
                record(n);
                if n < 3 { 20 } else { uloop_end(); }
            }, 10);
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![1, 2, 3]);

    let times = recorder.times();
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(20));
    }
}

#[tokio::test]
async fn test_other_return_fires_once() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_timeout(|| { record("once"); "again" }, 1);
            uloop_timeout(|| uloop_end(), 50);
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.strings(), vec!["once"]);
}

#[tokio::test]
async fn test_exception_cancels_timer_and_loop_continues() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_timeout(|| { record("tick"); throw "fail"; }, 1);
            uloop_timeout(|| { record("end"); uloop_end(); }, 50);
        }
        fn stop() { record("stop"); }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.strings(), vec!["tick", "end", "stop"]);
}

#[tokio::test]
async fn test_private_argument() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_timeout(|p| { record(p); uloop_end(); }, 1, "payload");
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.strings(), vec!["payload"]);
}

#[tokio::test]
async fn test_expiry_order() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            uloop_timeout(|| record(3), 30);
            uloop_timeout(|| record(1), 5);
            uloop_timeout(|| record(2), 5);
            uloop_timeout(|| uloop_end(), 60);
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(recorder.ints(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_return_values() {
    let (_file, runtime, recorder) = host(
        r#"
        fn start() {
            record(uloop_timeout(|| (), 1000));
            record(uloop_timeout("not a function", 1));
            record(uloop_timeout(|| (), "soon"));
            uloop_end();
        }
        "#,
    );

    assert_eq!(runtime.run_to_completion().await, 0);
    let values = recorder.ints();
    assert!(values[0] > 0);
    assert_eq!(&values[1..], &[-1, -1]);
}

#[tokio::test]
async fn test_pending_work_released_at_exit() {
    let (_file, mut runtime, _) = host(
        r#"
        let held = tracked();
        fn start() {
            let p = tracked();
            uloop_timeout(|| p, 60000);
            uloop_timeout(|x| (), 60000, tracked());
            uloop_process(|status| (), ["sleep", "5"], tracked());
            uloop_timeout(|| uloop_end(), 5);
        }
        "#,
    );
    let tracker = Tracker::install(&mut runtime);

    assert_eq!(runtime.run_to_completion().await, 0);
    assert_eq!(tracker.created(), 4);
    assert_eq!(tracker.live(), 0);
}
