mod deferral_tests;
mod notification_tests;
mod offline_replay_tests;
mod presence_tests;
