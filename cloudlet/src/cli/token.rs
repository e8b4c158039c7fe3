use std::time::Duration;

use server::identity::Identity;

pub fn run(secret: &str, user: &str, ttl: Duration) -> Result<(), String> {
    let token = Identity::new(secret)
        .issue(user, ttl)
        .map_err(|e| e.to_string())?;
    println!("{token}");
    Ok(())
}
