mod admin_tests;
mod health_tests;
