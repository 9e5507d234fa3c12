use rocket::Route;

mod elections;
mod voters;
mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(votes::routes());
    routes.extend(elections::routes());
    routes.extend(voters::routes());
    routes
}
