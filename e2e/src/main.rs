pub mod common;
pub mod myapp_e2e;

use common::Error;
use myapp_e2e::{myapp_drift_e2e_test, myapp_e2e_test, myapp_redis_e2e_test};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or_default();
    match cmd {
        "myapp" => {
            println!("Running myapp end-to-end test");
            myapp_e2e_test().await
        }
        "myapp-drift" => {
            println!("Running myapp end-to-end test for drift correction");
            myapp_drift_e2e_test().await
        }
        "myapp-redis" => {
            println!("Running myapp end-to-end test for the redis dependency");
            myapp_redis_e2e_test().await
        }
        _ => {
            println!("Please specify one test: myapp, myapp-drift or myapp-redis");
            Ok(())
        }
    }
}
