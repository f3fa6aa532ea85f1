mod crash_recovery_test;
mod restart_test;
